// Type descriptors and the operator/conversion tables.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

use crate::ast::ast_def::BinOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Void,
    Int,
    Float,
    Bool,
    Str,
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BaseType::Void => "Void",
            BaseType::Int => "Int",
            BaseType::Float => "Float",
            BaseType::Bool => "Boolean",
            BaseType::Str => "String",
        };
        write!(f, "{}", text)
    }
}

/// A type is either a simple base wrapped in some number of array levels,
/// or a function signature. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDesc {
    Simple { base: BaseType, array_level: usize },
    Func { ret: Box<TypeDesc>, params: Vec<TypeDesc> },
}

impl TypeDesc {
    pub const VOID: TypeDesc = TypeDesc::Simple { base: BaseType::Void, array_level: 0 };
    pub const INT: TypeDesc = TypeDesc::Simple { base: BaseType::Int, array_level: 0 };
    pub const FLOAT: TypeDesc = TypeDesc::Simple { base: BaseType::Float, array_level: 0 };
    pub const BOOL: TypeDesc = TypeDesc::Simple { base: BaseType::Bool, array_level: 0 };
    pub const STR: TypeDesc = TypeDesc::Simple { base: BaseType::Str, array_level: 0 };

    pub fn simple(base: BaseType) -> Self {
        TypeDesc::Simple { base, array_level: 0 }
    }

    pub fn func(ret: TypeDesc, params: Vec<TypeDesc>) -> Self {
        TypeDesc::Func { ret: Box::new(ret), params }
    }

    pub fn base_type(&self) -> Option<BaseType> {
        match self {
            TypeDesc::Simple { base, .. } => Some(*base),
            TypeDesc::Func { .. } => None,
        }
    }

    pub fn is_func(&self) -> bool {
        matches!(self, TypeDesc::Func { .. })
    }

    pub fn is_simple(&self) -> bool {
        !self.is_func()
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeDesc::Simple { array_level, .. } if *array_level > 0)
    }

    /// Base of a scalar (non-array, non-function) type.
    pub fn scalar_base(&self) -> Option<BaseType> {
        match self {
            TypeDesc::Simple { base, array_level: 0 } => Some(*base),
            _ => None,
        }
    }

    /// Type of an element of this array, one level down.
    pub fn element_type(&self) -> Option<TypeDesc> {
        match self {
            TypeDesc::Simple { base, array_level } if *array_level > 0 => {
                Some(TypeDesc::Simple { base: *base, array_level: array_level - 1 })
            }
            _ => None,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Simple { base, array_level } => {
                for _ in 0..*array_level {
                    write!(f, "Array<")?;
                }
                write!(f, "{}", base)?;
                for _ in 0..*array_level {
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeDesc::Func { ret, params } => {
                write!(f, "{} (", ret)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ")")
            }
        }
    }
}

lazy_static! {
    /// Directed implicit conversions, row order is the retry order.
    pub static ref TYPE_CONVERTIBILITY: HashMap<BaseType, Vec<BaseType>> = {
        let mut map = HashMap::new();
        map.insert(BaseType::Int, vec![BaseType::Float, BaseType::Bool, BaseType::Str]);
        map.insert(BaseType::Float, vec![BaseType::Str]);
        map.insert(BaseType::Bool, vec![BaseType::Str]);
        map
    };

    /// Exact operand pairs accepted by each binary operator.
    pub static ref BIN_OP_TYPE_COMPATIBILITY: HashMap<BinOp, HashMap<(BaseType, BaseType), BaseType>> = {
        use BaseType::*;
        let arith = vec![((Int, Int), Int), ((Float, Float), Float)];
        let compare = vec![((Int, Int), Bool), ((Float, Float), Bool), ((Str, Str), Bool)];
        let logic = vec![((Bool, Bool), Bool)];

        let mut map = HashMap::new();
        for (op, pairs) in [
            (BinOp::Add, vec![((Int, Int), Int), ((Float, Float), Float), ((Str, Str), Str)]),
            (BinOp::Sub, arith.clone()),
            (BinOp::Mul, arith.clone()),
            (BinOp::Div, arith),
            (BinOp::Gt, compare.clone()),
            (BinOp::Lt, compare.clone()),
            (BinOp::Ge, compare.clone()),
            (BinOp::Le, compare.clone()),
            (BinOp::Equals, compare.clone()),
            (BinOp::NotEquals, compare),
            (BinOp::LogicalAnd, logic.clone()),
            (BinOp::LogicalOr, logic),
        ] {
            map.insert(op, pairs.into_iter().collect());
        }
        map
    };
}

/// Directed: `Int` converts to `Float` but never back. Arrays, functions,
/// `String` and `Void` take part in no conversion.
pub fn can_type_convert_to(from: &TypeDesc, to: &TypeDesc) -> bool {
    match (from.scalar_base(), to.scalar_base()) {
        (Some(from_base), Some(to_base)) => TYPE_CONVERTIBILITY
            .get(&from_base)
            .map_or(false, |targets| targets.contains(&to_base)),
        _ => false,
    }
}

/// How a binary operation was matched against the compatibility table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpResolution {
    /// Operand types match a table pair as written.
    Exact(BaseType),
    /// Right operand must convert to `.0`, result base is `.1`.
    ConvertRight(BaseType, BaseType),
    /// Left operand must convert to `.0`, result base is `.1`.
    ConvertLeft(BaseType, BaseType),
}

/// Looks up the operator table with the exact pair first, then retries with
/// every type the right operand converts to, then the left operand.
pub fn resolve_bin_op(op: BinOp, left: BaseType, right: BaseType) -> Option<BinOpResolution> {
    let table = BIN_OP_TYPE_COMPATIBILITY.get(&op)?;
    if let Some(result) = table.get(&(left, right)) {
        return Some(BinOpResolution::Exact(*result));
    }
    if let Some(targets) = TYPE_CONVERTIBILITY.get(&right) {
        for target in targets {
            if let Some(result) = table.get(&(left, *target)) {
                return Some(BinOpResolution::ConvertRight(*target, *result));
            }
        }
    }
    if let Some(targets) = TYPE_CONVERTIBILITY.get(&left) {
        for target in targets {
            if let Some(result) = table.get(&(*target, right)) {
                return Some(BinOpResolution::ConvertLeft(*target, *result));
            }
        }
    }
    None
}
