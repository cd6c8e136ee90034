use crate::{
    ast::{BinOp, UnaryOp},
    functions::Function,
    value::Value,
};

/// A node of the compiled stage tree.
///
/// The parser builds the tree once; evaluation only ever reads it. Every
/// variant carries exactly the children its operator needs, so arity is
/// settled at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Constant value
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 'text'
    /// `^a+$`
    /// ```
    Literal(Value),

    /// Lookup in the caller's parameter source
    ///
    /// # Examples
    /// ```text
    /// foo
    /// [response-time]
    /// ```
    Parameter(String),

    /// Prefix operation
    Unary { op: UnaryOp, operand: Box<Stage> },

    /// Infix operation (arithmetic, comparison, logical, bitwise, regex, `in`, `??`)
    Binary {
        op: BinOp,
        left: Box<Stage>,
        right: Box<Stage>,
    },

    /// Conditional (`condition ? then : otherwise`)
    Ternary {
        condition: Box<Stage>,
        then: Box<Stage>,
        otherwise: Box<Stage>,
    },

    /// Call of a registered function
    ///
    /// # Example
    /// ```text
    /// max(a, b, 10)
    /// ```
    Call { function: Function, args: Vec<Stage> },

    /// Comma-separated list in parentheses
    ///
    /// # Example
    /// ```text
    /// role in ('admin', 'owner')
    /// ```
    Array(Vec<Stage>),

    /// Element access (`target[index]`)
    Index {
        target: Box<Stage>,
        index: Box<Stage>,
    },
}

impl Stage {
    pub fn literal(value: impl Into<Value>) -> Self {
        Stage::Literal(value.into())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Stage::Parameter(name.into())
    }

    pub fn unary(op: UnaryOp, operand: Stage) -> Self {
        Stage::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinOp, left: Stage, right: Stage) -> Self {
        Stage::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Binary and index stages, whose left child can continue a chain.
    pub fn is_chain_link(&self) -> bool {
        matches!(self, Stage::Binary { .. } | Stage::Index { .. })
    }

    /// Direct children, left to right.
    pub fn children(&self) -> Vec<&Stage> {
        match self {
            Stage::Literal(_) | Stage::Parameter(_) => Vec::new(),
            Stage::Unary { operand, .. } => vec![&**operand],
            Stage::Binary { left, right, .. } => vec![&**left, &**right],
            Stage::Ternary {
                condition,
                then,
                otherwise,
            } => vec![&**condition, &**then, &**otherwise],
            Stage::Call { args, .. } => args.iter().collect(),
            Stage::Array(items) => items.iter().collect(),
            Stage::Index { target, index } => vec![&**target, &**index],
        }
    }

    /// Number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.children().into_iter().map(Stage::node_count).sum::<usize>()
    }

    /// Distinct parameter names in first-use order.
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_parameters(&mut names);
        names
    }

    fn collect_parameters<'a>(&'a self, names: &mut Vec<&'a str>) {
        if let Stage::Parameter(name) = self {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
            return;
        }
        for child in self.children() {
            child.collect_parameters(names);
        }
    }
}
