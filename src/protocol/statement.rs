//! Typed statements and result entries, and their list representation.
//!
//! On the wire a statement is `[id, verb, operand...]` and a result entry is
//! `[id, value]`. A batch is a list of statements; a response is a list of
//! result entries.

use super::ProtocolError;
use super::codec::Value;
use super::exception::SlimException;
use std::fmt;

/// Result value of `import`, `make`, and `assign`.
pub const OK: &str = "OK";

/// Result value of a method that returns nothing.
pub const VOID: &str = "/__VOID__/";

/// Instruction verb as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Register a namespace used to resolve type names
    Import,
    /// Construct a fixture and bind it to a name
    Make,
    /// Invoke a method on a bound fixture
    Call,
    /// Invoke a method and store the result as a symbol
    CallAndAssign,
    /// Store a literal as a symbol
    Assign,
}

impl Verb {
    /// Wire spelling of the verb.
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Import => "import",
            Verb::Make => "make",
            Verb::Call => "call",
            Verb::CallAndAssign => "callAndAssign",
            Verb::Assign => "assign",
        }
    }

    /// Parse the wire spelling.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "import" => Some(Verb::Import),
            "make" => Some(Verb::Make),
            "call" => Some(Verb::Call),
            "callAndAssign" => Some(Verb::CallAndAssign),
            "assign" => Some(Verb::Assign),
            _ => None,
        }
    }

    /// Operands that must be present before any arguments.
    fn fixed_operands(self) -> usize {
        match self {
            Verb::Import => 1,
            Verb::Make | Verb::Call | Verb::Assign => 2,
            Verb::CallAndAssign => 3,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a statement asks the interpreter to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `import <path>`
    Import {
        /// Namespace prefix
        path: String,
    },
    /// `make <instance> <class> <arg>...`
    Make {
        /// Name to bind the new fixture under
        instance: String,
        /// Registered (or import-qualified) type name
        class: String,
        /// Constructor arguments
        args: Vec<Value>,
    },
    /// `call <instance> <method> <arg>...`
    Call {
        /// Bound fixture name
        instance: String,
        /// Method name
        method: String,
        /// Method arguments
        args: Vec<Value>,
    },
    /// `callAndAssign <symbol> <instance> <method> <arg>...`
    CallAndAssign {
        /// Symbol receiving the return value
        symbol: String,
        /// Bound fixture name
        instance: String,
        /// Method name
        method: String,
        /// Method arguments
        args: Vec<Value>,
    },
    /// `assign <symbol> <value>`
    Assign {
        /// Symbol name
        symbol: String,
        /// Literal value
        value: Value,
    },
}

impl Instruction {
    /// Verb of this instruction.
    pub fn verb(&self) -> Verb {
        match self {
            Instruction::Import { .. } => Verb::Import,
            Instruction::Make { .. } => Verb::Make,
            Instruction::Call { .. } => Verb::Call,
            Instruction::CallAndAssign { .. } => Verb::CallAndAssign,
            Instruction::Assign { .. } => Verb::Assign,
        }
    }

    fn args_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Instruction::Make { args, .. }
            | Instruction::Call { args, .. }
            | Instruction::CallAndAssign { args, .. } => Some(args),
            Instruction::Import { .. } | Instruction::Assign { .. } => None,
        }
    }
}

/// One caller-identified instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Caller-chosen identifier, unique within a batch
    pub id: String,
    /// Instruction to execute
    pub instruction: Instruction,
}

impl Statement {
    /// `import` statement.
    pub fn import(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            instruction: Instruction::Import { path: path.into() },
        }
    }

    /// `make` statement with no constructor arguments; add them with [`Statement::arg`].
    pub fn make(
        id: impl Into<String>,
        instance: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            instruction: Instruction::Make {
                instance: instance.into(),
                class: class.into(),
                args: Vec::new(),
            },
        }
    }

    /// `call` statement with no arguments; add them with [`Statement::arg`].
    pub fn call(
        id: impl Into<String>,
        instance: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            instruction: Instruction::Call {
                instance: instance.into(),
                method: method.into(),
                args: Vec::new(),
            },
        }
    }

    /// `callAndAssign` statement with no arguments.
    pub fn call_and_assign(
        id: impl Into<String>,
        symbol: impl Into<String>,
        instance: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            instruction: Instruction::CallAndAssign {
                symbol: symbol.into(),
                instance: instance.into(),
                method: method.into(),
                args: Vec::new(),
            },
        }
    }

    /// `assign` statement.
    pub fn assign(
        id: impl Into<String>,
        symbol: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            instruction: Instruction::Assign {
                symbol: symbol.into(),
                value: value.into(),
            },
        }
    }

    /// Append an argument. Ignored by `import` and `assign`.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        if let Some(args) = self.instruction.args_mut() {
            args.push(value.into());
        }
        self
    }

    /// Append several arguments. Ignored by `import` and `assign`.
    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if let Some(args) = self.instruction.args_mut() {
            args.extend(values.into_iter().map(Into::into));
        }
        self
    }

    /// Verb of this statement.
    pub fn verb(&self) -> Verb {
        self.instruction.verb()
    }

    /// List representation: `[id, verb, operand...]`.
    pub fn to_value(&self) -> Value {
        let mut items = vec![Value::str(&self.id), Value::str(self.verb().as_str())];
        match &self.instruction {
            Instruction::Import { path } => items.push(Value::str(path)),
            Instruction::Make {
                instance,
                class,
                args,
            } => {
                items.push(Value::str(instance));
                items.push(Value::str(class));
                items.extend(args.iter().cloned());
            }
            Instruction::Call {
                instance,
                method,
                args,
            } => {
                items.push(Value::str(instance));
                items.push(Value::str(method));
                items.extend(args.iter().cloned());
            }
            Instruction::CallAndAssign {
                symbol,
                instance,
                method,
                args,
            } => {
                items.push(Value::str(symbol));
                items.push(Value::str(instance));
                items.push(Value::str(method));
                items.extend(args.iter().cloned());
            }
            Instruction::Assign { symbol, value } => {
                items.push(Value::str(symbol));
                items.push(value.clone());
            }
        }
        Value::List(items)
    }

    /// Parse `[id, verb, operand...]`, validating the verb and operand count.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let items = value.into_list().ok_or_else(|| {
            ProtocolError::MalformedStatement("statement is not a list".into())
        })?;
        let mut items = items.into_iter();

        let id = next_string(&mut items, "statement id").map_err(ProtocolError::MalformedStatement)?;
        let verb_text = next_string(&mut items, "verb")
            .map_err(|_| ProtocolError::MalformedStatement(format!("statement '{id}' has no verb")))?;
        let verb = Verb::parse(&verb_text).ok_or_else(|| ProtocolError::UnknownVerb {
            id: id.clone(),
            verb: verb_text,
        })?;

        let operands: Vec<Value> = items.collect();
        if operands.len() < verb.fixed_operands() {
            return Err(ProtocolError::MalformedStatement(format!(
                "statement '{id}': {verb} needs {} operands, got {}",
                verb.fixed_operands(),
                operands.len()
            )));
        }
        let mut operands = operands.into_iter();
        let mut name = |what: &str| {
            next_string(&mut operands, what)
                .map_err(|err| ProtocolError::MalformedStatement(format!("statement '{id}': {err}")))
        };

        let instruction = match verb {
            Verb::Import => Instruction::Import {
                path: name("import path")?,
            },
            Verb::Make => Instruction::Make {
                instance: name("instance name")?,
                class: name("class name")?,
                args: operands.collect(),
            },
            Verb::Call => Instruction::Call {
                instance: name("instance name")?,
                method: name("method name")?,
                args: operands.collect(),
            },
            Verb::CallAndAssign => Instruction::CallAndAssign {
                symbol: name("symbol name")?,
                instance: name("instance name")?,
                method: name("method name")?,
                args: operands.collect(),
            },
            Verb::Assign => {
                let symbol = name("symbol name")?;
                let value = operands.next().ok_or_else(|| {
                    ProtocolError::MalformedStatement(format!("statement '{id}': missing value"))
                })?;
                Instruction::Assign { symbol, value }
            }
        };

        Ok(Statement { id, instruction })
    }
}

fn next_string(items: &mut impl Iterator<Item = Value>, what: &str) -> Result<String, String> {
    match items.next() {
        Some(Value::Str(text)) => Ok(text),
        Some(Value::List(_)) => Err(format!("{what} must be a string")),
        None => Err(format!("missing {what}")),
    }
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Returned value
    Value(Value),
    /// Encoded failure
    Exception(SlimException),
}

impl Outcome {
    /// Wire value: the value itself, or the encoded exception string.
    pub fn to_value(&self) -> Value {
        match self {
            Outcome::Value(value) => value.clone(),
            Outcome::Exception(exception) => Value::Str(exception.encode()),
        }
    }

    /// Classify a received value, recognising encoded exceptions.
    pub fn from_value(value: Value) -> Self {
        match value.as_str().and_then(SlimException::parse) {
            Some(exception) => Outcome::Exception(exception),
            None => Outcome::Value(value),
        }
    }

    /// The exception, if this outcome is one.
    pub fn exception(&self) -> Option<&SlimException> {
        match self {
            Outcome::Exception(exception) => Some(exception),
            Outcome::Value(_) => None,
        }
    }
}

/// One entry of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEntry {
    /// Identifier of the statement that produced this entry
    pub id: String,
    /// What the statement produced
    pub outcome: Outcome,
}

impl ResultEntry {
    /// List representation: `[id, value]`.
    pub fn to_value(&self) -> Value {
        Value::List(vec![Value::str(&self.id), self.outcome.to_value()])
    }

    /// Parse `[id, value]`.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let (id, value) = split_entry(value)?;
        Ok(ResultEntry {
            id,
            outcome: Outcome::from_value(value),
        })
    }
}

fn split_entry(value: Value) -> Result<(String, Value), ProtocolError> {
    let items = value
        .into_list()
        .ok_or_else(|| ProtocolError::MalformedResponse("result entry is not a list".into()))?;
    let [id, value]: [Value; 2] = items.try_into().map_err(|items: Vec<Value>| {
        ProtocolError::MalformedResponse(format!(
            "result entry has {} elements, expected 2",
            items.len()
        ))
    })?;
    let id = id
        .into_string()
        .ok_or_else(|| ProtocolError::MalformedResponse("result id must be a string".into()))?;
    Ok((id, value))
}

/// Encode a batch of statements as one list.
pub fn encode_statements(statements: &[Statement]) -> Value {
    Value::List(statements.iter().map(Statement::to_value).collect())
}

/// Decode a batch of statements. Any malformed statement fails the whole batch.
pub fn decode_statements(value: Value) -> Result<Vec<Statement>, ProtocolError> {
    value
        .into_list()
        .ok_or_else(|| ProtocolError::MalformedStatement("batch is not a list".into()))?
        .into_iter()
        .map(Statement::from_value)
        .collect()
}

/// Encode result entries as one list.
pub fn encode_results(results: &[ResultEntry]) -> Value {
    Value::List(results.iter().map(ResultEntry::to_value).collect())
}

/// Decode a response list into `(id, value)` pairs, leaving values exactly
/// as received.
pub fn decode_result_values(value: Value) -> Result<Vec<(String, Value)>, ProtocolError> {
    value
        .into_list()
        .ok_or_else(|| ProtocolError::MalformedResponse("response is not a list".into()))?
        .into_iter()
        .map(split_entry)
        .collect()
}

/// Decode a response list.
pub fn decode_results(value: Value) -> Result<Vec<ResultEntry>, ProtocolError> {
    value
        .into_list()
        .ok_or_else(|| ProtocolError::MalformedResponse("response is not a list".into()))?
        .into_iter()
        .map(ResultEntry::from_value)
        .collect()
}
