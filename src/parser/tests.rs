//! Parser tests.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::Scanner;
use crate::parser::Parser;

fn parse(source: &str) -> Program {
    let tokens = Scanner::new(source).scan_tokens().unwrap();
    Parser::new(tokens).parse().unwrap()
}

fn parse_expr(source: &str) -> Expr {
    let program = parse(source);
    match program.statements.into_iter().next().unwrap().kind {
        StmtKind::Expression(expr) => expr,
        other => panic!("Expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_precedence() {
    // 1 + 2 * 3 should parse as 1 + (2 * 3)
    let expr = parse_expr("1 + 2 * 3;");
    match expr.kind {
        ExprKind::Binary {
            op: BinaryOp::Add,
            rhs,
            ..
        } => match rhs.kind {
            ExprKind::Binary {
                op: BinaryOp::Multiply,
                ..
            } => {}
            _ => panic!("Expected multiply on right"),
        },
        _ => panic!("Expected add at top"),
    }
}

#[test]
fn test_comparison_binds_tighter_than_and() {
    let expr = parse_expr("a < b and c < d;");
    match expr.kind {
        ExprKind::Binary {
            op: BinaryOp::And, ..
        } => {}
        _ => panic!("Expected and at top"),
    }
}

#[test]
fn test_call() {
    let expr = parse_expr("Foo(1, 2);");
    match expr.kind {
        ExprKind::Call { name, args } => {
            assert_eq!(name, "Foo");
            assert_eq!(args.len(), 2);
        }
        _ => panic!("Expected call expression"),
    }
}

#[test]
fn test_method_call_chain() {
    let expr = parse_expr("obj.Push(1);");
    match expr.kind {
        ExprKind::MethodCall { object, name, args } => {
            assert_eq!(name, "Push");
            assert_eq!(args.len(), 1);
            assert!(matches!(object.kind, ExprKind::Variable(_)));
        }
        _ => panic!("Expected method call"),
    }
}

#[test]
fn test_nested_index() {
    let expr = parse_expr("a[1][2];");
    match expr.kind {
        ExprKind::Index { array, .. } => {
            assert!(matches!(array.kind, ExprKind::Index { .. }));
        }
        _ => panic!("Expected index expression"),
    }
}

#[test]
fn test_var_declaration() {
    let program = parse("var x = 1; var y;");
    assert_eq!(program.statements.len(), 2);
    match &program.statements[0].kind {
        StmtKind::Declaration { name, initializer } => {
            assert_eq!(name, "x");
            assert!(initializer.is_some());
        }
        _ => panic!("Expected declaration"),
    }
    match &program.statements[1].kind {
        StmtKind::Declaration { initializer, .. } => assert!(initializer.is_none()),
        _ => panic!("Expected declaration"),
    }
}

#[test]
fn test_extern_declaration() {
    let program = parse("extern Config;");
    match &program.statements[0].kind {
        StmtKind::ExternDeclaration { name } => assert_eq!(name, "Config"),
        _ => panic!("Expected extern declaration"),
    }
}

#[test]
fn test_assignment_and_compound() {
    let program = parse("x = 1; x += 2;");
    match &program.statements[0].kind {
        StmtKind::Assignment { op, .. } => assert!(op.is_none()),
        _ => panic!("Expected assignment"),
    }
    match &program.statements[1].kind {
        StmtKind::Assignment { op, .. } => assert_eq!(*op, Some(BinaryOp::Add)),
        _ => panic!("Expected compound assignment"),
    }
}

#[test]
fn test_index_assignment_target() {
    let program = parse("a[0] = 1;");
    match &program.statements[0].kind {
        StmtKind::Assignment { target, .. } => {
            assert!(matches!(target.kind, ExprKind::Index { .. }))
        }
        _ => panic!("Expected assignment"),
    }
}

#[test]
fn test_invalid_assignment_target() {
    let tokens = Scanner::new("1 + 2 = 3;").scan_tokens().unwrap();
    let err = Parser::new(tokens).parse().unwrap_err();
    assert!(matches!(err, ParserError::InvalidAssignmentTarget(_)));
}

#[test]
fn test_function_declaration() {
    let program = parse("function Add(a, b) { return a + b; }");
    assert_eq!(program.functions.len(), 1);
    let func = &program.functions[0];
    assert_eq!(func.name, "Add");
    assert_eq!(func.params, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_for_loop() {
    let program = parse("for (x in [1, 2]) { Print(x); }");
    match &program.statements[0].kind {
        StmtKind::For {
            variable, iterable, ..
        } => {
            assert_eq!(variable, "x");
            assert!(matches!(iterable.kind, ExprKind::Array(_)));
        }
        _ => panic!("Expected for loop"),
    }
}

#[test]
fn test_if_else() {
    let program = parse("if (a) { } else { }");
    match &program.statements[0].kind {
        StmtKind::If { else_body, .. } => assert!(else_body.is_some()),
        _ => panic!("Expected if"),
    }
}

#[test]
fn test_dangling_else_binds_to_innermost() {
    let program = parse("if (a) if (b) x = 1; else x = 2;");
    match &program.statements[0].kind {
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => {
            assert!(else_body.is_none());
            match &then_body.kind {
                StmtKind::If { else_body, .. } => assert!(else_body.is_some()),
                _ => panic!("Expected nested if"),
            }
        }
        _ => panic!("Expected if"),
    }
}

#[test]
fn test_return_forms() {
    let program = parse("function F() { return; } function G() { return 1; }");
    let StmtKind::Block(body) = &program.functions[0].body.kind else {
        panic!("Expected block body");
    };
    assert!(matches!(body[0].kind, StmtKind::Return(None)));
}

#[test]
fn test_missing_semicolon() {
    let tokens = Scanner::new("var a = 1").scan_tokens().unwrap();
    assert!(Parser::new(tokens).parse().is_err());
}
