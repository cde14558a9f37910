use rust_decimal::Decimal;

/// One positional argument of a textual function call.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeArg {
    /// Rendered inside double quotes
    Str(String),
    /// Rendered verbatim (integers, decimals, booleans, nested calls)
    Literal(String),
}

impl CodeArg {
    pub fn literal(text: impl Into<String>) -> Self {
        CodeArg::Literal(text.into())
    }

    fn render(&self) -> String {
        match self {
            CodeArg::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            CodeArg::Literal(s) => s.clone(),
        }
    }
}

impl From<&str> for CodeArg {
    fn from(s: &str) -> Self {
        CodeArg::Str(s.to_string())
    }
}

impl From<String> for CodeArg {
    fn from(s: String) -> Self {
        CodeArg::Str(s)
    }
}

impl From<&String> for CodeArg {
    fn from(s: &String) -> Self {
        CodeArg::Str(s.clone())
    }
}

macro_rules! literal_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for CodeArg {
            fn from(v: $t) -> Self {
                CodeArg::Literal(v.to_string())
            }
        })*
    };
}

literal_from_int!(i32, i64, u32, u64, bool);

impl From<f64> for CodeArg {
    fn from(v: f64) -> Self {
        // decimals need a fractional part or the chain reads them as integers
        if v.is_finite() && v.fract() == 0.0 {
            CodeArg::Literal(format!("{:.1}", v))
        } else {
            CodeArg::Literal(v.to_string())
        }
    }
}

impl From<Decimal> for CodeArg {
    fn from(v: Decimal) -> Self {
        if v.scale() == 0 {
            CodeArg::Literal(format!("{}.0", v))
        } else {
            CodeArg::Literal(v.to_string())
        }
    }
}

/// Render `(function arg1 arg2 ...)`.
///
/// Argument names only document the call; the target function receives them
/// positionally, so they must be supplied in the order it declares them.
pub fn assemble_code(function: &str, args: &[(&str, CodeArg)]) -> String {
    let mut code = String::with_capacity(function.len() + 2);
    code.push('(');
    code.push_str(function);
    for (_, arg) in args {
        code.push(' ');
        code.push_str(&arg.render());
    }
    code.push(')');
    code
}

/// Fluent form of [`assemble_code`].
#[derive(Debug, Clone)]
pub struct CodeBuilder {
    function: String,
    args: Vec<(String, CodeArg)>,
}

impl CodeBuilder {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<CodeArg>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    pub fn build(&self) -> String {
        let args: Vec<(&str, CodeArg)> = self
            .args
            .iter()
            .map(|(name, value)| (name.as_str(), value.clone()))
            .collect();
        assemble_code(&self.function, &args)
    }
}
