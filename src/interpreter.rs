//! Tree‑walking evaluator.
//!
//! Statements are executed with `execute`, expressions with `evaluate`; both
//! match exhaustively over the AST. The interpreter holds the global
//! environment, the current environment, and the scope distances recorded by
//! the resolver. `return` travels back up as [`Flow::Return`] rather than
//! through the error channel.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, info};

use crate::callable::{Callable, Class, Instance, NativeFunction, UserFunction, INITIALIZER};
use crate::environment::Environment;
use crate::error::{LoxError, Result, RuntimeError};
use crate::expr::{Expr, ExprId, LiteralValue};
use crate::resolver::Locals;
use crate::stmt::{ClassDecl, Stmt};
use crate::token::{Token, TokenType};
use crate::value::Value;

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    /// A `return` on `line` is unwinding to the nearest call boundary.
    Return { value: Value, line: usize },
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: Locals,
    output: Box<dyn Write>,
    /// Value of the most recent top‑level expression statement.
    last_value: Value,
    repl_mode: bool,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates an interpreter printing to stdout, with `clock` predefined.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Creates an interpreter whose `print` output goes to `output`.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        info!("Initializing Interpreter");

        let globals = Rc::new(RefCell::new(Environment::new()));

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define(
            "clock",
            Value::Callable(Callable::Native(Rc::new(NativeFunction::clock()))),
        );

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            output,
            last_value: Value::Nil,
            repl_mode: false,
        }
    }

    /// In REPL mode, top‑level expression statements print their value.
    pub fn set_repl_mode(&mut self, repl_mode: bool) {
        self.repl_mode = repl_mode;
    }

    /// Merge scope distances produced by the resolver.
    pub fn add_locals(&mut self, locals: Locals) {
        debug!("Recording {} resolved local(s)", locals.len());

        self.locals.extend(locals);
    }

    pub fn last_value(&self) -> &Value {
        &self.last_value
    }

    /// Interprets a list of top‑level statements (a "program").
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            if let Flow::Return { line, .. } = self.execute(stmt)? {
                return Err(LoxError::runtime(line, RuntimeError::TopLevelReturn));
            }

            if self.repl_mode {
                if let Stmt::Expression(_) = stmt {
                    let echoed: String = self.last_value.to_string();
                    self.emit(&echoed)?;
                }
            }
        }

        info!("Interpretation completed successfully");

        Ok(())
    }

    /// Run `statements` in `environment`, restoring the current environment
    /// afterwards on every path.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<Flow> {
        let previous = std::mem::replace(&mut self.environment, environment);

        let result = self.execute_all(statements);

        self.environment = previous;
        result
    }

    fn execute_all(&mut self, statements: &[Stmt]) -> Result<Flow> {
        for stmt in statements {
            if let flow @ Flow::Return { .. } = self.execute(stmt)? {
                return Ok(flow);
            }
        }

        Ok(Flow::Normal)
    }

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Expression(expr) => {
                self.last_value = self.evaluate(expr)?;
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                self.emit(&value.to_string())?;
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                debug!("Defining variable '{}' = {}", name.lexeme, value);

                self.environment.borrow_mut().define(&name.lexeme, value);
            }

            Stmt::Block(statements) => {
                let environment = Environment::child_of(&self.environment);
                return self.execute_block(statements, environment);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    return self.execute(then_branch);
                } else if let Some(else_stmt) = else_branch {
                    return self.execute(else_stmt);
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let flow @ Flow::Return { .. } = self.execute(body)? {
                        return Ok(flow);
                    }
                }
            }

            Stmt::Function(declaration) => {
                debug!("Defining function '{}'", declaration.name.lexeme);

                let function = UserFunction::new(
                    Rc::clone(declaration),
                    Rc::clone(&self.environment),
                    false,
                );

                self.environment.borrow_mut().define(
                    &declaration.name.lexeme,
                    Value::Callable(Callable::Function(Rc::new(function))),
                );
            }

            Stmt::Return { keyword, value } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                debug!("Returning value: {}", value);

                return Ok(Flow::Return {
                    value,
                    line: keyword.line,
                });
            }

            Stmt::Class(class) => self.execute_class(class)?,
        }

        Ok(Flow::Normal)
    }

    fn execute_class(&mut self, class: &ClassDecl) -> Result<()> {
        debug!("Defining class '{}'", class.name.lexeme);

        let superclass: Option<Rc<Class>> = match &class.superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Callable(Callable::Class(superclass)) => Some(superclass),
                _ => {
                    let line: usize = match expr {
                        Expr::Variable { name, .. } => name.line,
                        _ => class.name.line,
                    };

                    return Err(LoxError::runtime(line, RuntimeError::SuperclassNotClass));
                }
            },
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(&class.name.lexeme, Value::Nil);

        // Methods of a subclass close over an extra scope holding `super`.
        let method_env: Rc<RefCell<Environment>> = match &superclass {
            Some(superclass) => {
                let env = Environment::child_of(&self.environment);
                env.borrow_mut().define(
                    "super",
                    Value::Callable(Callable::Class(Rc::clone(superclass))),
                );
                env
            }
            None => Rc::clone(&self.environment),
        };

        let methods: HashMap<String, Rc<UserFunction>> = class
            .methods
            .iter()
            .map(|method| {
                let function = UserFunction::new(
                    Rc::clone(method),
                    Rc::clone(&method_env),
                    method.name.lexeme == INITIALIZER,
                );

                (method.name.lexeme.clone(), Rc::new(function))
            })
            .collect();

        let value = Value::Callable(Callable::Class(Rc::new(Class::new(
            &class.name.lexeme,
            superclass,
            methods,
        ))));

        self.environment.borrow_mut().assign(&class.name, value)?;

        info!("Class '{}' defined", class.name.lexeme);

        Ok(())
    }

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => {
                let right = self.evaluate(right)?;
                evaluate_unary(operator, right)
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                evaluate_binary(operator, left, right)
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;

                let short_circuits = match operator.token_type {
                    TokenType::OR => left.is_truthy(),
                    _ => !left.is_truthy(),
                };

                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&distance) => {
                        Environment::set_at(&self.environment, distance, name, value.clone())?
                    }
                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;

                let mut values: Vec<Value> = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument)?);
                }

                match callee {
                    Value::Callable(callable) => callable.call(self, values, paren),
                    _ => Err(LoxError::runtime(paren.line, RuntimeError::NotCallable)),
                }
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => Instance::get(&instance, name),
                _ => Err(LoxError::runtime(name.line, RuntimeError::NotAnInstance)),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(LoxError::runtime(
                        name.line,
                        RuntimeError::FieldOnNonInstance,
                    ));
                };

                let value = self.evaluate(value)?;
                instance.borrow_mut().set(name, value.clone());

                Ok(value)
            }

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),
        }
    }

    /// `super.method`: find `method` starting at the superclass of the class
    /// that declared the running method, bound to the current `this`.
    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> Result<Value> {
        let distance: usize = self.locals.get(&id).copied().ok_or_else(|| {
            LoxError::runtime(
                keyword.line,
                RuntimeError::UndefinedVariable("super".to_string()),
            )
        })?;

        let superclass = match Environment::get_at(&self.environment, distance, keyword)? {
            Value::Callable(Callable::Class(class)) => class,
            _ => {
                return Err(LoxError::runtime(
                    keyword.line,
                    RuntimeError::SuperclassNotClass,
                ))
            }
        };

        // `this` always lives one scope inside `super`.
        let this = Token::synthetic("this", keyword.line);
        let this_distance: usize = distance.checked_sub(1).ok_or_else(|| {
            LoxError::runtime(
                keyword.line,
                RuntimeError::ScopeMismatch {
                    distance,
                    name: "this".to_string(),
                },
            )
        })?;

        let instance = match Environment::get_at(&self.environment, this_distance, &this)? {
            Value::Instance(instance) => instance,
            _ => return Err(LoxError::runtime(keyword.line, RuntimeError::NotAnInstance)),
        };

        let found = superclass.find_method(&method.lexeme).ok_or_else(|| {
            LoxError::runtime(
                method.line,
                RuntimeError::UndefinedProperty(method.lexeme.clone()),
            )
        })?;

        Ok(Value::Callable(Callable::Function(Rc::new(
            found.bind(instance),
        ))))
    }

    /// Resolved locals use their recorded distance; everything else is global.
    fn look_up_variable(&self, id: ExprId, name: &Token) -> Result<Value> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, name),
            None => self.globals.borrow().get(name),
        }
    }

    fn emit(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{}", text)?;
        self.output.flush()?;

        debug!("Printed: {}", text);

        Ok(())
    }
}

fn evaluate_unary(operator: &Token, right: Value) -> Result<Value> {
    match operator.token_type {
        TokenType::MINUS => match right {
            Value::Number(n) => Ok(Value::Number(-n)),
            _ => Err(LoxError::runtime(
                operator.line,
                RuntimeError::OperandNotNumber,
            )),
        },
        _ => Ok(Value::Bool(!right.is_truthy())),
    }
}

fn evaluate_binary(operator: &Token, left: Value, right: Value) -> Result<Value> {
    debug!("Binary '{}' on {} and {}", operator.lexeme, left, right);

    if let TokenType::EQUAL_EQUAL | TokenType::BANG_EQUAL = operator.token_type {
        let equal: bool = left == right;
        return Ok(Value::Bool(match operator.token_type {
            TokenType::EQUAL_EQUAL => equal,
            _ => !equal,
        }));
    }

    let (a, b) = match (left, right) {
        (Value::Number(a), Value::Number(b)) => (a, b),

        (Value::String(a), Value::String(b)) if operator.token_type == TokenType::PLUS => {
            return Ok(Value::String(a + &b));
        }

        _ => {
            let error = if operator.token_type == TokenType::PLUS {
                RuntimeError::OperandsNotNumbersOrStrings
            } else {
                RuntimeError::OperandsNotNumbers
            };

            return Err(LoxError::runtime(operator.line, error));
        }
    };

    Ok(match operator.token_type {
        TokenType::PLUS => Value::Number(a + b),
        TokenType::MINUS => Value::Number(a - b),
        TokenType::STAR => Value::Number(a * b),
        TokenType::SLASH => Value::Number(a / b),
        TokenType::GREATER => Value::Bool(a > b),
        TokenType::GREATER_EQUAL => Value::Bool(a >= b),
        TokenType::LESS => Value::Bool(a < b),
        // LESS_EQUAL; the parser produces no other binary operators.
        _ => Value::Bool(a <= b),
    })
}
