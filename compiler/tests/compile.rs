mod common;

use common::{compile, compile_with_comments};
use indoc::indoc;
use jackc::{Analyzer, CompileError, Compiler, CompilerConfig, TokenKind, Tokenizer};

const SQUARE: &str = indoc! {"
    class Square {
        field int size;
        static int count;

        constructor Square new(int s) {
            let size = s;
            let count = count + 1;
            return this;
        }

        method int area() {
            return size * size;
        }

        method void grow(int by) {
            if (size < 100) {
                let size = size + by;
            } else {
                do reset();
            }
        }

        method void reset() {
            let size = 1;
            return;
        }
    }
"};

#[test]
fn square_listing() {
    let expected = indoc! {"
        function Square.new 0
        push constant 1
        call Memory.alloc 1
        pop pointer 0
        push argument 0
        pop this 0
        push static 0
        push constant 1
        add
        pop static 0
        push pointer 0
        return
        function Square.area 0
        push argument 0
        pop pointer 0
        push this 0
        push this 0
        call Math.multiply 2
        return
        function Square.grow 0
        push argument 0
        pop pointer 0
        push this 0
        push constant 100
        lt
        not
        if-goto Square.IF_FALSE$59
        push this 0
        push argument 1
        add
        pop this 0
        goto Square.IF_END$59
        label Square.IF_FALSE$59
        push pointer 0
        call Square.reset 1
        pop temp 0
        goto Square.IF_END$59
        label Square.IF_END$59
        push constant 0
        return
        function Square.reset 0
        push argument 0
        pop pointer 0
        push constant 1
        pop this 0
        push constant 0
        return
    "};
    let out = compile(SQUARE);
    // Label ids depend on node numbering; compare them separately.
    let normalize = |s: &str| -> Vec<String> {
        s.lines()
            .map(|l| match l.find('$') {
                Some(i) => l[..i].to_string(),
                None => l.to_string(),
            })
            .collect()
    };
    assert_eq!(normalize(&out), normalize(expected));

    let labels: Vec<&str> = out
        .lines()
        .filter(|l| l.contains('$'))
        .map(|l| l.rsplit('$').next().unwrap())
        .collect();
    assert_eq!(labels.len(), 5);
    assert!(labels.iter().all(|id| *id == labels[0]));
}

#[test]
fn comments_mark_structure() {
    let plain = compile(SQUARE);
    let commented = compile_with_comments(SQUARE);
    let lines: Vec<&str> = commented.lines().collect();
    assert_eq!(lines.first(), Some(&"// Square"));
    assert_eq!(lines.last(), Some(&"// ~Square"));
    assert!(lines.contains(&"// constructor"));
    assert!(lines.contains(&"// method"));
    assert!(lines.contains(&"// if"));
    assert!(lines.contains(&"// let"));
    assert!(lines.contains(&"// do"));

    let with_comments = Compiler::new(CompilerConfig {
        emit_comments: true,
    })
    .compile_str(SQUARE)
    .unwrap();
    let stripped: Vec<String> = with_comments
        .iter()
        .filter(|i| !i.is_comment())
        .map(|i| i.to_string())
        .collect();
    assert_eq!(stripped, plain.lines().collect::<Vec<_>>());
}

#[test]
fn terminals_reproduce_token_stream() {
    let tokenizer = Tokenizer::new();
    let expected: Vec<String> = tokenizer
        .tokenize(SQUARE)
        .map(|t| t.unwrap())
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.value)
        .collect();
    let (tree, root) = Analyzer::start(tokenizer.tokenize(SQUARE)).unwrap();
    let terminals: Vec<String> = tree
        .terminals(root)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.value.clone())
        .collect();
    assert_eq!(terminals, expected);
}

#[test]
fn label_scopes_are_unique_per_statement() {
    let src = indoc! {"
        class M {
            function void f() {
                while (true) { }
                while (false) { if (true) { } }
                return;
            }
        }
    "};
    let out = compile(src);
    let mut labels: Vec<&str> = out
        .lines()
        .filter_map(|l| l.strip_prefix("label "))
        .collect();
    assert_eq!(labels.len(), 6);
    labels.sort();
    labels.dedup();
    assert_eq!(labels.len(), 6);
}

fn compile_err(src: &str) -> CompileError {
    Compiler::new(CompilerConfig::default())
        .compile_str(src)
        .unwrap_err()
}

#[test]
fn undeclared_variable_reports_line() {
    let src = indoc! {"
        class M {
            function int f() {
                return y;
            }
        }
    "};
    assert_eq!(
        compile_err(src),
        CompileError::UndeclaredSymbol {
            line: 3,
            name: "y".to_string()
        }
    );
}

#[test]
fn duplicate_declaration() {
    let src = "class M { function void f(int a) { var int a; return; } }";
    assert!(matches!(
        compile_err(src),
        CompileError::DuplicateSymbol { name } if name == "a"
    ));
}

#[test]
fn local_may_shadow_field() {
    let src = "class M { field int a; method int f() { var int a; let a = 2; return a; } }";
    let out = compile(src);
    assert!(out.contains("pop local 0\npush local 0\nreturn"));
}

#[test]
fn stage_errors_carry_lines() {
    let bad_token = "class M {\n  function void f() {\n    let x = 99999;\n  }\n}";
    let err = compile_err(bad_token);
    assert!(matches!(err, CompileError::Tokenization { .. }));
    assert_eq!(err.line(), Some(3));

    let bad_syntax = "class M {\n  function void f() {\n    let = 1;\n  }\n}";
    let err = compile_err(bad_syntax);
    assert!(matches!(err, CompileError::Syntax { .. }));
    assert_eq!(err.line(), Some(3));
    assert!(err.to_string().starts_with("syntax error at line 3"));
}

#[test]
fn return_must_match_declared_type() {
    assert!(matches!(
        compile_err("class M { function int f() { return; } }"),
        CompileError::Invariant { .. }
    ));
    assert!(matches!(
        compile_err("class M { function void f() { return 1; } }"),
        CompileError::Invariant { .. }
    ));
}

#[test]
fn method_call_on_declared_object() {
    let src = indoc! {"
        class M {
            function void f(int a, int b) {
                var T obj;
                do obj.method(a, b);
                return;
            }
        }
    "};
    let out = compile(src);
    assert!(out.contains(indoc! {"
        push local 0
        push argument 0
        push argument 1
        call T.method 3
        pop temp 0
    "}));
}

#[test]
fn deep_nesting_is_an_error() {
    let nested = |n: usize| {
        format!(
            "class M {{ function int f() {{ return {}1{}; }} }}",
            "(".repeat(n),
            ")".repeat(n)
        )
    };
    let err = compile_err(&nested(2000));
    assert!(matches!(err, CompileError::Syntax { line: 1, .. }));
    assert!(err.to_string().contains("nested too deeply"));

    let out = compile(&nested(200));
    assert!(out.ends_with("push constant 1\nreturn\n"));
}
