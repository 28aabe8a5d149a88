#[cfg(test)]
mod interpreter_tests {
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    use glox::interpreter::Interpreter;
    use glox::parser::Parser;
    use glox::scanner::Scanner;
    use glox::value::Value;
    use glox::{Lox, LoxError, RuntimeError};
    use pretty_assertions::assert_eq;

    /// Clonable in‑memory sink so tests can read what the session printed.
    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).expect("output is UTF-8")
        }
    }

    fn session() -> (Lox, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Lox::with_output(Box::new(buffer.clone())), buffer)
    }

    fn run(program: &str) -> (String, glox::Result<()>) {
        let (mut lox, buffer) = session();
        let result = lox.run(program);
        (buffer.contents(), result)
    }

    fn assert_output(program: &str, expected: &str) {
        let (output, result) = run(program);

        if let Err(e) = result {
            panic!("program failed: {}\n{}", e, program);
        }

        assert_eq!(output.trim_end_matches('\n'), expected, "program: {}", program);
    }

    fn runtime_error(program: &str) -> (String, RuntimeError) {
        let (output, result) = run(program);

        match result {
            Err(LoxError::Runtime { source, .. }) => (output, source),
            other => panic!("expected runtime error, got {:?}", other),
        }
    }

    // ───────────────────────────── expressions ──────────────────────────────

    #[test]
    fn simple_program() {
        assert_output("print \"one\"; print true; print 2 + 1;", "one\ntrue\n3");
    }

    #[test]
    fn arithmetic_follows_ieee_doubles() {
        assert_output("print 6 / 4;", "1.5");
        assert_output(
            "var x = 5; var y = 6; print y + x; print y * y; y = x / 3; print y;",
            "11\n36\n1.6666666666666667",
        );
        assert_output("print 0.1 + 0.2;", "0.30000000000000004");
        assert_output("print -(3 - 10);", "7");
        assert_output("print 1 / 0;", "inf");
    }

    #[test]
    fn comparisons_use_the_right_operator() {
        assert_output(
            "print 1 < 2; print 2 <= 2; print 3 > 4; print 3 >= 4; print 4 >= 3;",
            "true\ntrue\nfalse\nfalse\ntrue",
        );
    }

    #[test]
    fn string_concatenation() {
        assert_output("print \"foo\" + \"bar\";", "foobar");
    }

    #[test]
    fn equality_without_coercion() {
        assert_output(
            "print nil == nil; print nil == false; print 1 == 1; print \"1\" == 1; print \"a\" != \"a\";",
            "true\nfalse\ntrue\nfalse\nfalse",
        );
    }

    #[test]
    fn truthiness_and_short_circuit_values() {
        assert_output("print 0 or false;", "0");
        assert_output("print \"hi\" or false and false;", "hi");
        assert_output("print (\"hi\" or false) and false;", "false");
        assert_output("print nil or \"fallback\";", "fallback");
        assert_output("print !\"\"; print !nil;", "false\ntrue");
        assert_output(
            "var x = true; var y = false; print(x and y); print(x or y);",
            "false\ntrue",
        );
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        assert_output("false and undefined(); true or undefined(); print \"ok\";", "ok");
    }

    #[test]
    fn operand_type_errors() {
        assert_eq!(runtime_error("print -\"x\";").1, RuntimeError::OperandNotNumber);
        assert_eq!(runtime_error("print 1 < \"2\";").1, RuntimeError::OperandsNotNumbers);
        assert_eq!(
            runtime_error("print 1 + \"2\";").1,
            RuntimeError::OperandsNotNumbersOrStrings
        );
    }

    // ──────────────────────────── variables ─────────────────────────────────

    #[test]
    fn block_scoping_and_shadowing() {
        assert_output(
            "var a = 10; { print a; var a = 20; print a; } print a;",
            "10\n20\n10",
        );
    }

    #[test]
    fn assigning_undeclared_variable_fails_without_output() {
        let (output, error) = runtime_error("x = 5;");

        assert_eq!(error, RuntimeError::UndefinedVariable("x".into()));
        assert!(output.is_empty());
    }

    #[test]
    fn runtime_error_reports_message_and_line() {
        let (_, result) = run("print 1;\nprint missing;");

        assert_eq!(
            result.unwrap_err().to_string(),
            "Undefined variable 'missing'.\n[line 2]"
        );
    }

    #[test]
    fn closure_binding_is_fixed_at_resolution() {
        assert_output(
            "var a = \"global\"; { fun show() { print a; } show(); var a = \"block\"; show(); }",
            "global\nglobal",
        );
    }

    // ──────────────────────────── control flow ──────────────────────────────

    #[test]
    fn while_and_for_loops() {
        assert_output(
            "var x = 0; while (x < 5) { x = x + 1; print x; }",
            "1\n2\n3\n4\n5",
        );
        assert_output("for (var i = 1; i <= 3; i = i + 1) { print i; }", "1\n2\n3");
    }

    #[test]
    fn fibonacci_with_for() {
        assert_output(
            "var a = 0; var temp; for (var b = 1; a < 100; b = temp + b) { print a; temp = a; a = b; }",
            "0\n1\n1\n2\n3\n5\n8\n13\n21\n34\n55\n89",
        );
    }

    #[test]
    fn if_else_branches() {
        assert_output(
            "if (0) print \"zero is truthy\"; else print \"no\"; if (nil) print 1; else print 2;",
            "zero is truthy\n2",
        );
    }

    // ───────────────────────────── functions ────────────────────────────────

    #[test]
    fn recursion() {
        assert_output(
            "fun countSkip(n) { if (n > 1) countSkip(n - 2); print n; } countSkip(10);",
            "0\n2\n4\n6\n8\n10",
        );
        assert_output(
            "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(15);",
            "610",
        );
    }

    #[test]
    fn return_unwinds_out_of_loops() {
        assert_output(
            "fun first() { var i = 0; while (true) { i = i + 1; if (i == 3) return i; } } print first();",
            "3",
        );
    }

    #[test]
    fn missing_return_yields_nil() {
        assert_output("fun f() {} print f();", "nil");
        assert_output("fun g() { return; } print g();", "nil");
    }

    #[test]
    fn counter_closures_keep_independent_state() {
        assert_output(
            "fun makeCounter() { var i = 0; fun count() { i = i + 1; print i; } return count; }
             var a = makeCounter(); var b = makeCounter();
             a(); a(); b();",
            "1\n2\n1",
        );
    }

    #[test]
    fn closures_share_their_enclosing_scope() {
        assert_output(
            "var get; var set;
             { var shared = 1;
               fun g() { return shared; } fun s(v) { shared = v; }
               get = g; set = s; }
             set(42); print get();",
            "42",
        );
    }

    #[test]
    fn functions_print_their_name() {
        assert_output("fun hello() {} print hello; print clock;", "<fn hello>\n<native fn clock>");
    }

    #[test]
    fn clock_returns_seconds() {
        assert_output("print clock() > 1000000000;", "true");
    }

    #[test]
    fn call_errors() {
        assert_eq!(runtime_error("\"x\"();").1, RuntimeError::NotCallable);
        assert_eq!(
            runtime_error("fun f(a, b) {} f(1);").1,
            RuntimeError::ArityMismatch {
                expected: 2,
                got: 1
            }
        );
    }

    // ────────────────────────────── classes ─────────────────────────────────

    #[test]
    fn class_and_instance_display() {
        assert_output(
            "class Bagel {} print Bagel; print Bagel();",
            "<class Bagel>\nBagel instance",
        );
    }

    #[test]
    fn fields_round_trip() {
        assert_output("class A {} var a = A(); a.x = 1; print a.x;", "1");
    }

    #[test]
    fn methods_bind_this() {
        assert_output(
            "class Cake { taste() { print \"The \" + this.flavor + \" cake is delicious!\"; } }
             var cake = Cake(); cake.flavor = \"German chocolate\"; cake.taste();",
            "The German chocolate cake is delicious!",
        );
    }

    #[test]
    fn bound_methods_remember_their_instance() {
        assert_output(
            "class P { init(n) { this.n = n; } name() { return this.n; } }
             var m = P(\"first\").name; var other = P(\"second\");
             print m();",
            "first",
        );
    }

    #[test]
    fn init_returns_the_instance() {
        assert_output(
            "class Foo { init() { this.v = 7; return; } }
             var foo = Foo(); print foo.init() == foo; print foo.v;",
            "true\n7",
        );
    }

    #[test]
    fn class_arity_comes_from_init() {
        assert_eq!(
            runtime_error("class A { init(a, b) {} } A(1);").1,
            RuntimeError::ArityMismatch {
                expected: 2,
                got: 1
            }
        );
        assert_eq!(
            runtime_error("class B {} B(1);").1,
            RuntimeError::ArityMismatch {
                expected: 0,
                got: 1
            }
        );
    }

    #[test]
    fn inherited_methods_run() {
        assert_output(
            "class Doughnut { cook() { print \"Fry until golden brown.\"; } }
             class BostonCream < Doughnut {}
             BostonCream().cook();",
            "Fry until golden brown.",
        );
    }

    #[test]
    fn super_calls_the_immediate_superclass() {
        assert_output(
            "class A { method() { print \"A method\"; } }
             class B < A { method() { print \"B method\"; } test() { super.method(); } }
             class C < B {}
             C().test();",
            "A method",
        );
    }

    #[test]
    fn super_in_overriding_method() {
        assert_output(
            "class Doughnut { cook() { print \"Fry\"; } }
             class Cream < Doughnut { cook() { super.cook(); print \"Pipe\"; } }
             Cream().cook();",
            "Fry\nPipe",
        );
    }

    #[test]
    fn superclass_init_via_super() {
        assert_output(
            "class Base { init(x) { this.x = x; } }
             class Derived < Base { init(x, y) { super.init(x); this.y = y; } }
             var d = Derived(1, 2); print d.x + d.y;",
            "3",
        );
    }

    #[test]
    fn property_errors() {
        assert_eq!(
            runtime_error("class A {} A().missing;").1,
            RuntimeError::UndefinedProperty("missing".into())
        );
        assert_eq!(runtime_error("var n = 1; n.x;").1, RuntimeError::NotAnInstance);
        assert_eq!(runtime_error("var n = 1; n.x = 2;").1, RuntimeError::FieldOnNonInstance);
        assert_eq!(
            runtime_error("class A {} class B < A { f() { return super.g(); } } B().f();").1,
            RuntimeError::UndefinedProperty("g".into())
        );
    }

    #[test]
    fn superclass_must_be_a_class() {
        assert_eq!(
            runtime_error("var NotAClass = \"so not a class\"; class Sub < NotAClass {}").1,
            RuntimeError::SuperclassNotClass
        );

        let (_, result) = run("var NotAClass = 1;\nclass Sub <\n  NotAClass {}");
        assert_eq!(
            result.unwrap_err().to_string(),
            "Superclass must be a class.\n[line 3]"
        );
    }

    #[test]
    fn unresolved_top_level_return_reports_its_line() {
        let buffer = SharedBuffer::default();
        let mut interpreter = Interpreter::with_output(Box::new(buffer.clone()));

        let (tokens, _) = Scanner::new("print 1;\n{\n  return 2;\n}").scan_tokens();
        let statements = Parser::new(&tokens).parse().unwrap();

        let err = interpreter.interpret(&statements).unwrap_err();

        assert!(matches!(
            err,
            LoxError::Runtime {
                source: RuntimeError::TopLevelReturn,
                line: 3
            }
        ));
        assert_eq!(buffer.contents(), "1\n");
    }

    // ───────────────────────────── static errors ────────────────────────────

    #[test]
    fn resolution_errors_prevent_any_execution() {
        let (output, result) = run("print \"before\"; return 4;");

        assert!(matches!(result, Err(LoxError::Resolve { .. })));
        assert!(output.is_empty());

        let (output, result) = run("print 1; class Oops < Oops {}");
        assert!(matches!(result, Err(LoxError::Resolve { .. })));
        assert!(output.is_empty());
    }

    #[test]
    fn parse_errors_halt_a_file_run() {
        let (output, result) = run("print 1; print \"hello world\"");

        assert!(matches!(result, Err(LoxError::Parse { .. })));
        assert!(output.is_empty());
    }

    #[test]
    fn scan_errors_halt_a_file_run() {
        let (output, result) = run("print 1; @ print 2;");

        let err = result.unwrap_err();
        assert!(matches!(err, LoxError::Lex { line: 1, .. }));
        assert_eq!(err.to_string(), "[line 1] Error: Unexpected character: @");
        assert!(output.is_empty());
    }

    // ────────────────────────────── sessions ────────────────────────────────

    #[test]
    fn expression_statements_update_the_last_value() {
        let (mut lox, _) = session();

        lox.run("var a = 2; a * 21;").unwrap();

        assert_eq!(lox.last_value(), &Value::Number(42.0));
    }

    #[test]
    fn globals_persist_across_runs() {
        let (mut lox, buffer) = session();

        lox.run("var count = 1; fun bump() { count = count + 1; return count; }")
            .unwrap();
        lox.run("{ var local = bump(); print local; }").unwrap();
        lox.run("print bump();").unwrap();

        assert_eq!(buffer.contents(), "2\n3\n");
    }

    #[test]
    fn repl_echoes_expressions_and_survives_errors() {
        let (mut lox, buffer) = session();
        let input: &[u8] = b"var a = 1;\na + 1;\nprint nope;\nprint ;\nvar f = 2; f;\nexit\nprint \"unreached\";\n";
        let mut errors: Vec<u8> = Vec::new();

        lox.repl(input, &mut errors).unwrap();

        assert_eq!(buffer.contents(), "2\n2\n");

        let errors = String::from_utf8(errors).unwrap();
        assert!(errors.contains("Undefined variable 'nope'."), "{}", errors);
        assert!(errors.contains("Expect expression."), "{}", errors);
    }

    #[test]
    fn repl_reports_scan_errors() {
        let (mut lox, buffer) = session();
        let input: &[u8] = b"var x = 1 @;\nprint #;\n";
        let mut errors: Vec<u8> = Vec::new();

        lox.repl(input, &mut errors).unwrap();

        let errors = String::from_utf8(errors).unwrap();
        assert!(errors.contains("[line 1] Error: Unexpected character: @"), "{}", errors);
        assert!(errors.contains("[line 1] Error: Unexpected character: #"), "{}", errors);
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn run_line_puts_scan_errors_first_and_runs_nothing() {
        let (mut lox, buffer) = session();

        let errors = lox.run_line("var x = 1 @;").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], LoxError::Lex { .. }));

        // The declaration never ran.
        assert!(matches!(
            lox.run_line("print x;").unwrap_err()[0],
            LoxError::Runtime {
                source: RuntimeError::UndefinedVariable(_),
                ..
            }
        ));

        let errors = lox.run_line("1 @ 2;").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], LoxError::Lex { .. }));
        assert!(matches!(errors[1], LoxError::Parse { .. }));
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn run_line_collects_every_parse_error() {
        let (mut lox, buffer) = session();

        let errors = lox.run_line("print ; var = 2; print 3;").unwrap_err();

        assert_eq!(errors.len(), 2);
        assert!(buffer.contents().is_empty());
    }
}
