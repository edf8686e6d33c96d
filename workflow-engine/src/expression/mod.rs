// Expression Engine Module
// GitHub-style ${{ }} expressions: lexing, parsing and evaluation

pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

pub use evaluator::{
    resolve_identifier, values_equal, ActionInputsProvider, EvalError, EvalMode, Evaluator,
    ExpressionEngine, FromValue, StaticVariables, VariableProvider,
};
pub use functions::BuiltinFunctions;
pub use lexer::{contains_expression, extract_expressions, LexError, Lexer, Segment, Token};
pub use parser::{BinaryOp, Expr, ExprParser, ParseExprError};
pub use value::{format_number, Value};
