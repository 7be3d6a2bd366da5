//! Immutable expression trees.
//!
//! Expressions are a closed sum type with `Box`ed operands. Convenience
//! constructors keep test and lowering code readable:
//!
//! ```
//! use veriscan_ir::Expression;
//!
//! // x > 0 && y < 10
//! let expr = Expression::and(
//!     Expression::gt(Expression::var("x"), Expression::int(0)),
//!     Expression::lt(Expression::var("y"), Expression::int(10)),
//! );
//! assert!(expr.expression_type().is_boolean());
//! ```
//!
//! Coercions between booleans and integers are explicit cast nodes,
//! inserted by the semantic pre-pass of the lowering front end. The
//! `change(old, new)` pairing marks a point where two revisions of the
//! same program differ; it is inert outside shadow execution.

use std::fmt;

/// Binary operators.
///
/// Division, modulo, and exponentiation are representable but not
/// executable: the engine raises an unsupported-operation error when it
/// encounters them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // ---- Arithmetic (Int x Int -> Int) ----
    /// Addition.
    Add,
    /// Subtraction.
    Subtract,
    /// Multiplication.
    Multiply,
    /// Integer division. Not executable.
    Divide,
    /// Remainder. Not executable.
    Modulo,
    /// Exponentiation. Not executable.
    Exponentiation,

    // ---- Comparison (Int x Int -> Bool) ----
    /// Greater than.
    GreaterThan,
    /// Less than.
    LessThan,
    /// Greater than or equal.
    GreaterThanOrEqual,
    /// Less than or equal.
    LessThanOrEqual,
    /// Equality, on both sorts.
    Equality,
    /// Inequality, on both sorts.
    Inequality,

    // ---- Logic (Bool x Bool -> Bool) ----
    /// Conjunction.
    BooleanAnd,
    /// Disjunction.
    BooleanOr,
    /// Exclusive or.
    BooleanXor,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "MOD",
            BinaryOperator::Exponentiation => "**",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::LessThan => "<",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::Equality => "=",
            BinaryOperator::Inequality => "<>",
            BinaryOperator::BooleanAnd => "AND",
            BinaryOperator::BooleanOr => "OR",
            BinaryOperator::BooleanXor => "XOR",
        };
        write!(f, "{}", symbol)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Arithmetic negation.
    Negation,
    /// Boolean complement.
    Complement,
    /// Unary plus, an arithmetic identity.
    UnaryPlus,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Negation => write!(f, "-"),
            UnaryOperator::Complement => write!(f, "NOT"),
            UnaryOperator::UnaryPlus => write!(f, "+"),
        }
    }
}

/// The statically inferred sort of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionType {
    /// Integer-sorted.
    Arithmetic,
    /// Boolean-sorted.
    Boolean,
    /// Not determinable from the expression alone (variable accesses and
    /// nondeterministic constants resolve against an interface).
    Undefined,
}

impl ExpressionType {
    /// Whether the expression is known to be boolean-sorted.
    pub fn is_boolean(&self) -> bool {
        matches!(self, ExpressionType::Boolean)
    }

    /// Whether the expression is known to be integer-sorted.
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, ExpressionType::Arithmetic)
    }
}

/// An immutable expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Boolean literal.
    BooleanConstant(bool),

    /// Integer literal.
    IntegerConstant(i64),

    /// Time literal in milliseconds, solved as an integer.
    TimeConstant(i64),

    /// Enumeration literal with its declaration index.
    EnumeratedValue {
        /// The literal as written.
        literal: String,
        /// The declaration-order index.
        index: i64,
    },

    /// A value chosen freshly by the environment.
    ///
    /// Only permitted as the sole right-hand side of an assignment, where
    /// it is equivalent to a havoc of the assigned variable.
    NondeterministicConstant,

    /// Access to a variable of the enclosing scope.
    VariableAccess(String),

    /// Access to a field of a sub-program instance.
    FieldAccess {
        /// The record being accessed, a variable or another field access.
        record: Box<Expression>,
        /// The accessed field name.
        field: String,
    },

    /// Unary operation.
    Unary {
        /// The operator.
        op: UnaryOperator,
        /// The operand.
        operand: Box<Expression>,
    },

    /// Binary operation.
    Binary {
        /// The operator.
        op: BinaryOperator,
        /// The left operand.
        left: Box<Expression>,
        /// The right operand.
        right: Box<Expression>,
    },

    /// A point where two program revisions differ: `old` is the previous
    /// behavior, `new` the current one.
    Change {
        /// The old revision's expression.
        old: Box<Expression>,
        /// The new revision's expression.
        new: Box<Expression>,
    },

    /// Explicit boolean-to-integer coercion.
    BooleanToIntegerCast(Box<Expression>),

    /// Explicit integer-to-boolean coercion.
    IntegerToBooleanCast(Box<Expression>),

    /// Value selection over merged paths. Internal to state merging and
    /// never produced by the lowering front end.
    Phi {
        /// The candidate values in merge order.
        operands: Vec<Expression>,
    },
}

impl Expression {
    /// Create a boolean literal.
    pub fn bool(value: bool) -> Self {
        Expression::BooleanConstant(value)
    }

    /// Create an integer literal.
    pub fn int(value: i64) -> Self {
        Expression::IntegerConstant(value)
    }

    /// Create a time literal, in milliseconds.
    pub fn time(milliseconds: i64) -> Self {
        Expression::TimeConstant(milliseconds)
    }

    /// Create a variable access.
    ///
    /// ```
    /// use veriscan_ir::Expression;
    ///
    /// let x = Expression::var("x");
    /// ```
    pub fn var(name: impl Into<String>) -> Self {
        Expression::VariableAccess(name.into())
    }

    /// Create a field access on a record expression.
    ///
    /// ```
    /// use veriscan_ir::Expression;
    ///
    /// // f.b
    /// let access = Expression::field(Expression::var("f"), "b");
    /// assert_eq!(access.access_path(), Some("f.b".to_string()));
    /// ```
    pub fn field(record: Expression, field: impl Into<String>) -> Self {
        Expression::FieldAccess { record: Box::new(record), field: field.into() }
    }

    /// Create a unary operation.
    pub fn unary(op: UnaryOperator, operand: Expression) -> Self {
        Expression::Unary { op, operand: Box::new(operand) }
    }

    /// Create a binary operation.
    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    /// Boolean complement: `NOT operand`.
    pub fn not(operand: Expression) -> Self {
        Self::unary(UnaryOperator::Complement, operand)
    }

    /// Arithmetic negation: `-operand`.
    pub fn neg(operand: Expression) -> Self {
        Self::unary(UnaryOperator::Negation, operand)
    }

    /// Addition: `left + right`.
    pub fn add(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Add, left, right)
    }

    /// Subtraction: `left - right`.
    pub fn sub(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Subtract, left, right)
    }

    /// Multiplication: `left * right`.
    pub fn mul(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Multiply, left, right)
    }

    /// Equality: `left = right`.
    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Equality, left, right)
    }

    /// Inequality: `left <> right`.
    pub fn ne(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Inequality, left, right)
    }

    /// Greater than: `left > right`.
    pub fn gt(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::GreaterThan, left, right)
    }

    /// Less than: `left < right`.
    pub fn lt(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::LessThan, left, right)
    }

    /// Greater than or equal: `left >= right`.
    pub fn ge(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::GreaterThanOrEqual, left, right)
    }

    /// Less than or equal: `left <= right`.
    pub fn le(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::LessThanOrEqual, left, right)
    }

    /// Conjunction: `left AND right`.
    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::BooleanAnd, left, right)
    }

    /// Disjunction: `left OR right`.
    pub fn or(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::BooleanOr, left, right)
    }

    /// Exclusive or: `left XOR right`.
    pub fn xor(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::BooleanXor, left, right)
    }

    /// Pair an old-revision expression with its new-revision counterpart.
    pub fn change(old: Expression, new: Expression) -> Self {
        Expression::Change { old: Box::new(old), new: Box::new(new) }
    }

    /// Whether this expression is a variable or field access.
    pub fn is_access(&self) -> bool {
        matches!(self, Expression::VariableAccess(_) | Expression::FieldAccess { .. })
    }

    /// The dotted access path of a variable or field access, relative to
    /// the enclosing scope.
    ///
    /// Returns `None` for any other expression shape.
    pub fn access_path(&self) -> Option<String> {
        match self {
            Expression::VariableAccess(name) => Some(name.clone()),
            Expression::FieldAccess { record, field } => {
                record.access_path().map(|prefix| format!("{}.{}", prefix, field))
            }
            _ => None,
        }
    }

    /// Infer the sort of this expression from its structure alone.
    pub fn expression_type(&self) -> ExpressionType {
        match self {
            Expression::BooleanConstant(_) => ExpressionType::Boolean,
            Expression::IntegerConstant(_)
            | Expression::TimeConstant(_)
            | Expression::EnumeratedValue { .. } => ExpressionType::Arithmetic,
            Expression::NondeterministicConstant => ExpressionType::Undefined,
            Expression::VariableAccess(_) | Expression::FieldAccess { .. } => {
                ExpressionType::Undefined
            }
            Expression::Unary { op, .. } => match op {
                UnaryOperator::Negation | UnaryOperator::UnaryPlus => ExpressionType::Arithmetic,
                UnaryOperator::Complement => ExpressionType::Boolean,
            },
            Expression::Binary { op, .. } => match op {
                BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
                | BinaryOperator::Exponentiation => ExpressionType::Arithmetic,
                _ => ExpressionType::Boolean,
            },
            Expression::Change { old, .. } => old.expression_type(),
            Expression::BooleanToIntegerCast(_) => ExpressionType::Arithmetic,
            Expression::IntegerToBooleanCast(_) => ExpressionType::Boolean,
            Expression::Phi { operands } => operands
                .first()
                .map(Expression::expression_type)
                .unwrap_or(ExpressionType::Undefined),
        }
    }
}

// Rendering is recursive and fully parenthesized; precedence is not
// reconstructed.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::BooleanConstant(value) => write!(f, "{}", value),
            Expression::IntegerConstant(value) => write!(f, "{}", value),
            Expression::TimeConstant(value) => write!(f, "T#{}ms", value),
            Expression::EnumeratedValue { literal, .. } => write!(f, "{}", literal),
            Expression::NondeterministicConstant => write!(f, "?"),
            Expression::VariableAccess(name) => write!(f, "{}", name),
            Expression::FieldAccess { record, field } => write!(f, "{}.{}", record, field),
            Expression::Unary { op, operand } => write!(f, "{}({})", op, operand),
            Expression::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op, right)
            }
            Expression::Change { old, new } => write!(f, "change({}, {})", old, new),
            Expression::BooleanToIntegerCast(operand) => {
                write!(f, "BOOL_TO_INT({})", operand)
            }
            Expression::IntegerToBooleanCast(operand) => {
                write!(f, "INT_TO_BOOL({})", operand)
            }
            Expression::Phi { operands } => {
                write!(f, "phi(")?;
                for (position, operand) in operands.iter().enumerate() {
                    if position > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
        }
    }
}
