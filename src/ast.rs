//! Expression and pattern trees (§3). Every node carries a [`Span`] so the
//! evaluator and reporter never have to guess a location from context.

use std::rc::Rc;

use crate::token::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Pipeline,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

/// A string literal's body, pre-split into literal chunks and parsed
/// sub-expressions (§4.2, "String interpolation").
#[derive(Debug, Clone, PartialEq)]
pub enum InterpolationPart {
    Literal(String),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    pub key: FieldKey,
    pub value: Expr,
    pub is_patch: bool,
    pub doc: Option<String>,
    pub key_location: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKey {
    Static(String),
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElement {
    Normal(Expr),
    Spread(Expr),
    ConditionalIf(Expr, Expr),
    ConditionalUnless(Expr, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComprehensionClause {
    pub pattern: Pattern,
    pub iterable: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenBranch {
    pub pattern: Pattern,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereBinding {
    pub pattern: Pattern,
    pub value: Expr,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    Symbol(String),
    String(String),
    StringInterpolation(Vec<InterpolationPart>),

    Identifier(String),

    Lambda {
        param: Box<Pattern>,
        body: Box<Expr>,
    },

    Application {
        function: Box<Expr>,
        argument: Box<Expr>,
    },

    Let {
        pattern: Box<Pattern>,
        value: Box<Expr>,
        body: Box<Expr>,
        doc: Option<String>,
    },

    WhereExpr {
        expr: Box<Expr>,
        bindings: Vec<WhereBinding>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },

    WhenMatches {
        value: Box<Expr>,
        branches: Vec<WhenBranch>,
        otherwise: Option<Box<Expr>>,
    },

    Object {
        fields: Vec<ObjectField>,
        module_doc: Option<String>,
    },

    ObjectExtend {
        base: Box<Expr>,
        fields: Vec<ObjectField>,
    },

    Array {
        elements: Vec<ArrayElement>,
    },

    Tuple {
        elements: Vec<Expr>,
    },

    ArrayComprehension {
        body: Box<Expr>,
        clauses: Vec<ComprehensionClause>,
        filter: Option<Box<Expr>>,
    },

    ObjectComprehension {
        key: Box<Expr>,
        value: Box<Expr>,
        clauses: Vec<ComprehensionClause>,
        filter: Option<Box<Expr>>,
    },

    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },

    FieldAccess {
        object: Box<Expr>,
        field: String,
        field_location: Span,
    },

    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },

    FieldAccessor {
        fields: Vec<String>,
    },

    FieldProjection {
        object: Box<Expr>,
        fields: Vec<String>,
    },

    ImportExpr {
        path: String,
        path_location: Span,
    },

    OperatorFunction {
        op: BinaryOp,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub data: Rc<ExprKind>,
    pub location: Span,
}

impl Expr {
    pub fn new(data: ExprKind, location: Span) -> Self {
        Self {
            data: Rc::new(data),
            location,
        }
    }

    pub fn kind(&self) -> &ExprKind {
        &self.data
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    Wildcard,
    Identifier(String),
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(String),
    Boolean(bool),
    Null,
    Tuple(Vec<Pattern>),
    Array {
        elements: Vec<Pattern>,
        rest: Option<String>,
    },
    Object {
        fields: Vec<(String, Pattern)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub data: Rc<PatternKind>,
    pub location: Span,
}

impl Pattern {
    pub fn new(data: PatternKind, location: Span) -> Self {
        Self {
            data: Rc::new(data),
            location,
        }
    }

    pub fn kind(&self) -> &PatternKind {
        &self.data
    }

    /// Every identifier bound anywhere in this pattern, in left-to-right
    /// order. Used by the parser to validate `where`/`let` bindings and by
    /// diagnostics that need to name what a pattern introduces.
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self.kind() {
            PatternKind::Identifier(name) => out.push(name.clone()),
            PatternKind::Tuple(items) => items.iter().for_each(|p| p.bound_names(out)),
            PatternKind::Array { elements, rest } => {
                elements.iter().for_each(|p| p.bound_names(out));
                if let Some(name) = rest {
                    out.push(name.clone());
                }
            }
            PatternKind::Object { fields } => {
                fields.iter().for_each(|(_, p)| p.bound_names(out))
            }
            _ => {}
        }
    }
}
