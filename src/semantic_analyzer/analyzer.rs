// Semantic analysis: one depth-first walk that resolves names, checks and
// coerces types, and decorates nodes. Children are fully analyzed before a
// node computes its own resolved type. The walk consumes each node and hands
// back a possibly rewritten one, so implicit conversions replace a child
// instead of mutating through an alias.

use log::debug;

use crate::ast;
use crate::ast::ast_def::*;
use super::namespace::{IdentDesc, Namesp};
use super::types::{can_type_convert_to, resolve_bin_op, BaseType, BinOpResolution, TypeDesc};
use super::{SemResult, SemanticError, SemanticErrorKind};

/// Library functions every program sees. Seeded through the regular pipeline
/// so their descriptors look exactly like user declarations.
pub const BUILT_IN_OBJECTS: &str = r#"
    fun readLine(): String {}
    fun println(p0: String): Void {}
    fun toInt(p0: String): Int {}
    fun toFloat(p0: String): Float {}
"#;

/// Fresh root scope with the built-in library registered and the global
/// variable counter rewound for user code.
pub fn prepare_global_scope() -> Namesp {
    let builtins = ast::parse(BUILT_IN_OBJECTS).expect("built-in fragment must parse");
    let mut scope = Namesp::new();
    builtins
        .analyze(&mut scope)
        .expect("built-in fragment must pass analysis");
    scope.mark_all_built_in();
    scope.reset_global_var_counter();
    debug!("global scope seeded with the built-in library");
    scope
}

/// Analyzes a whole program against a freshly seeded global scope.
pub fn analyze_program(prog: StmtListNode) -> SemResult<StmtListNode> {
    let mut scope = prepare_global_scope();
    prog.analyze(&mut scope)
}

pub trait AnalyzeSemantics: Sized {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self>;
}

/// Coerces `expr` to `target`: identity when the types already match, a
/// conversion wrapper when the directed table allows it, an error otherwise.
fn convert_expr(expr: ExprNode, target: &TypeDesc) -> SemResult<ExprNode> {
    let pos = expr.pos();
    let actual = expr
        .resolved_type()
        .cloned()
        .expect("expression analyzed before conversion");
    if actual == *target {
        return Ok(expr);
    }
    if can_type_convert_to(&actual, target) {
        return Ok(ExprNode::TypeConvert(Box::new(TypeConvertNode::wrap(expr, target.clone()))));
    }
    Err(SemanticError::new(
        SemanticErrorKind::CannotConvert { from: actual, to: target.clone() },
        pos,
    ))
}

/// Turns a written type annotation into a descriptor.
fn resolve_type(node: &TypeNode) -> SemResult<TypeDesc> {
    let unknown = || {
        SemanticError::new(SemanticErrorKind::UnknownType(node.type_text()), node.info.pos)
    };
    if node.name == "Array" {
        let arg = node.arg.as_deref().ok_or_else(unknown)?;
        return match resolve_type(arg)? {
            TypeDesc::Simple { base, array_level } => {
                Ok(TypeDesc::Simple { base, array_level: array_level + 1 })
            }
            TypeDesc::Func { .. } => Err(unknown()),
        };
    }
    if node.arg.is_some() {
        return Err(unknown());
    }
    let base = match node.name.as_str() {
        "Void" => BaseType::Void,
        "Int" => BaseType::Int,
        "Float" => BaseType::Float,
        "Boolean" => BaseType::Bool,
        "String" => BaseType::Str,
        _ => return Err(unknown()),
    };
    Ok(TypeDesc::simple(base))
}

impl AnalyzeSemantics for ExprNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        match self {
            ExprNode::Literal(n) => Ok(ExprNode::Literal(n.analyze(scope)?)),
            ExprNode::Ident(n) => Ok(ExprNode::Ident(n.analyze(scope)?)),
            ExprNode::BinOp(n) => Ok(ExprNode::BinOp(Box::new((*n).analyze(scope)?))),
            ExprNode::Call(n) => Ok(ExprNode::Call(n.analyze(scope)?)),
            ExprNode::ArrayIndex(n) => Ok(ExprNode::ArrayIndex(Box::new((*n).analyze(scope)?))),
            // Conversions are synthesized after their subtree was analyzed.
            ExprNode::TypeConvert(n) => Ok(ExprNode::TypeConvert(n)),
        }
    }
}

impl AnalyzeSemantics for LiteralNode {
    fn analyze(mut self, _scope: &mut Namesp) -> SemResult<Self> {
        let base = match self.value {
            LiteralValue::Int(_) => BaseType::Int,
            LiteralValue::Float(_) => BaseType::Float,
            LiteralValue::Str(_) => BaseType::Str,
            LiteralValue::Bool(_) => BaseType::Bool,
        };
        self.info.ty = Some(TypeDesc::simple(base));
        Ok(self)
    }
}

impl AnalyzeSemantics for IdentNode {
    fn analyze(mut self, scope: &mut Namesp) -> SemResult<Self> {
        let desc = scope.lookup(&self.name).cloned().ok_or_else(|| {
            SemanticError::new(SemanticErrorKind::IdentNotFound(self.name.clone()), self.info.pos)
        })?;
        self.info.ty = Some(desc.ty.clone());
        self.info.ident = Some(desc);
        Ok(self)
    }
}

impl AnalyzeSemantics for BinOpNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let BinOpNode { op, left, right, mut info } = self;
        let left = (*left).analyze(scope)?;
        let right = (*right).analyze(scope)?;

        let left_ty = left.resolved_type().cloned().expect("operand analyzed");
        let right_ty = right.resolved_type().cloned().expect("operand analyzed");
        let pos = info.pos;
        let incompatible = move |left_ty, right_ty| {
            SemanticError::new(
                SemanticErrorKind::IncompatibleOperands { op, left: left_ty, right: right_ty },
                pos,
            )
        };

        let (left_base, right_base) = match (left_ty.scalar_base(), right_ty.scalar_base()) {
            (Some(l), Some(r)) => (l, r),
            _ => return Err(incompatible(left_ty, right_ty)),
        };

        let (left, right, result) = match resolve_bin_op(op, left_base, right_base) {
            Some(BinOpResolution::Exact(result)) => (left, right, result),
            Some(BinOpResolution::ConvertRight(to, result)) => {
                let right = convert_expr(right, &TypeDesc::simple(to))?;
                (left, right, result)
            }
            Some(BinOpResolution::ConvertLeft(to, result)) => {
                let left = convert_expr(left, &TypeDesc::simple(to))?;
                (left, right, result)
            }
            None => return Err(incompatible(left_ty, right_ty)),
        };

        info.ty = Some(TypeDesc::simple(result));
        Ok(BinOpNode { op, left: Box::new(left), right: Box::new(right), info })
    }
}

impl AnalyzeSemantics for CallNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let CallNode { mut func, args, mut info } = self;
        let pos = info.pos.or(func.info.pos);
        let name = func.name.clone();

        let desc = scope.lookup(&name).cloned().ok_or_else(|| {
            SemanticError::new(SemanticErrorKind::IdentNotFound(name.clone()), pos)
        })?;
        let (ret, param_types) = match &desc.ty {
            TypeDesc::Func { ret, params } => ((**ret).clone(), params.clone()),
            _ => return Err(SemanticError::new(SemanticErrorKind::NotCallable(name), pos)),
        };

        if args.len() != param_types.len() {
            return Err(SemanticError::new(
                SemanticErrorKind::ArityMismatch {
                    name,
                    expected: param_types.len(),
                    actual: args.len(),
                },
                pos,
            ));
        }

        let args = args
            .into_iter()
            .map(|arg| arg.analyze(scope))
            .collect::<SemResult<Vec<_>>>()?;
        let actual = args
            .iter()
            .map(|arg| arg.resolved_type().expect("argument analyzed").to_string())
            .collect::<Vec<_>>()
            .join(", ");

        // Check every argument before reporting, so one report names them all.
        let mut converted = Vec::with_capacity(args.len());
        let mut failures = Vec::new();
        for (i, (arg, want)) in args.into_iter().zip(&param_types).enumerate() {
            match convert_expr(arg, want) {
                Ok(arg) => converted.push(arg),
                Err(err) => failures.push(format!("argument {}: {}", i + 1, err.kind)),
            }
        }
        if !failures.is_empty() {
            let expected = param_types
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SemanticError::new(
                SemanticErrorKind::ArgumentTypeMismatch {
                    name,
                    details: failures.join("; "),
                    expected,
                    actual,
                },
                pos,
            ));
        }

        func.info.ty = Some(desc.ty.clone());
        func.info.ident = Some(desc);
        info.ty = Some(ret);
        Ok(CallNode { func, args: converted, info })
    }
}

impl AnalyzeSemantics for ArrayIndexNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let ArrayIndexNode { array, index, mut info } = self;
        let array = array.analyze(scope)?;
        let element = array
            .info
            .ty
            .as_ref()
            .and_then(|ty| ty.element_type())
            .ok_or_else(|| {
                SemanticError::new(SemanticErrorKind::NotAnArray(array.name.clone()), info.pos)
            })?;
        let index = convert_expr((*index).analyze(scope)?, &TypeDesc::INT)?;
        info.ty = Some(element);
        Ok(ArrayIndexNode { array, index: Box::new(index), info })
    }
}

impl AnalyzeSemantics for StmtListNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let StmtListNode { stmts, mut info } = self;
        let stmts = stmts
            .into_iter()
            .map(|stmt| stmt.analyze(scope))
            .collect::<SemResult<Vec<_>>>()?;
        info.ty = Some(TypeDesc::VOID);
        Ok(StmtListNode { stmts, info })
    }
}

impl AnalyzeSemantics for StmtNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        match self {
            StmtNode::VarDecl(n) => Ok(StmtNode::VarDecl(n.analyze(scope)?)),
            StmtNode::Assign(n) => Ok(StmtNode::Assign(n.analyze(scope)?)),
            StmtNode::Call(n) => Ok(StmtNode::Call(n.analyze(scope)?)),
            StmtNode::If(n) => Ok(StmtNode::If(Box::new((*n).analyze(scope)?))),
            StmtNode::While(n) => Ok(StmtNode::While(Box::new((*n).analyze(scope)?))),
            StmtNode::For(n) => Ok(StmtNode::For(Box::new((*n).analyze(scope)?))),
            StmtNode::ForRange(n) => Ok(StmtNode::ForRange(Box::new((*n).analyze(scope)?))),
            StmtNode::When(n) => Ok(StmtNode::When(n.analyze(scope)?)),
            StmtNode::FuncDecl(n) => Ok(StmtNode::FuncDecl(n.analyze(scope)?)),
            StmtNode::Return(n) => Ok(StmtNode::Return(n.analyze(scope)?)),
            StmtNode::Block(n) => {
                scope.enter_scope();
                let block = n.analyze(scope)?;
                scope.exit_scope();
                Ok(StmtNode::Block(block))
            }
        }
    }
}

impl AnalyzeSemantics for VarDeclNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let VarDeclNode { mut name, var_type, init, mut info } = self;
        let ty = resolve_type(&var_type)?;

        // The initializer may not see the name it initializes.
        let init = match init {
            Some(expr) => Some(expr.analyze(scope)?),
            None => None,
        };

        let desc = scope.add_ident(IdentDesc::new(&name.name, ty.clone()), name.info.pos)?;
        name.info.ty = Some(ty.clone());
        name.info.ident = Some(desc);

        let init = match init {
            Some(expr) => Some(convert_expr(expr, &ty)?),
            None => None,
        };
        info.ty = Some(TypeDesc::VOID);
        Ok(VarDeclNode { name, var_type, init, info })
    }
}

impl AnalyzeSemantics for AssignNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let AssignNode { target, value, mut info } = self;
        let target = target.analyze(scope)?;
        let target_ty = target.resolved_type().cloned().expect("target analyzed");
        let value = convert_expr(value.analyze(scope)?, &target_ty)?;
        info.ty = Some(TypeDesc::VOID);
        Ok(AssignNode { target, value, info })
    }
}

impl AnalyzeSemantics for IfNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let IfNode { cond, then_block, else_stmt, mut info } = self;
        let cond = convert_expr(cond.analyze(scope)?, &TypeDesc::BOOL)?;

        scope.enter_scope();
        let then_block = then_block.analyze(scope)?;
        scope.exit_scope();

        // An else block opens its own scope via StmtNode::Block; an else-if
        // chain handles itself.
        let else_stmt = match else_stmt {
            Some(stmt) => Some(Box::new((*stmt).analyze(scope)?)),
            None => None,
        };

        info.ty = Some(TypeDesc::VOID);
        Ok(IfNode { cond, then_block, else_stmt, info })
    }
}

impl AnalyzeSemantics for WhileNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let WhileNode { cond, body, mut info } = self;
        let cond = convert_expr(cond.analyze(scope)?, &TypeDesc::BOOL)?;
        scope.enter_scope();
        let body = body.analyze(scope)?;
        scope.exit_scope();
        info.ty = Some(TypeDesc::VOID);
        Ok(WhileNode { cond, body, info })
    }
}

impl AnalyzeSemantics for ForNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let ForNode { init, cond, step, body, mut info } = self;
        scope.enter_scope();
        let init = init.analyze(scope)?;
        let cond = convert_expr(cond.analyze(scope)?, &TypeDesc::BOOL)?;
        let step = step.analyze(scope)?;
        scope.enter_scope();
        let body = body.analyze(scope)?;
        scope.exit_scope();
        scope.exit_scope();
        info.ty = Some(TypeDesc::VOID);
        Ok(ForNode { init, cond, step, body, info })
    }
}

impl AnalyzeSemantics for ForRangeNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let ForRangeNode { mut var, start, end, body, mut info } = self;
        scope.enter_scope();
        let desc = scope.add_ident(IdentDesc::new(&var.name, TypeDesc::INT), var.info.pos)?;
        var.info.ty = Some(TypeDesc::INT);
        var.info.ident = Some(desc);
        let start = convert_expr(start.analyze(scope)?, &TypeDesc::INT)?;
        let end = convert_expr(end.analyze(scope)?, &TypeDesc::INT)?;
        scope.enter_scope();
        let body = body.analyze(scope)?;
        scope.exit_scope();
        scope.exit_scope();
        info.ty = Some(TypeDesc::VOID);
        Ok(ForRangeNode { var, start, end, body, info })
    }
}

impl WhenBranchNode {
    fn analyze_against(self, scope: &mut Namesp, scrutinee_ty: &TypeDesc) -> SemResult<Self> {
        let WhenBranchNode { value, body, mut info } = self;
        let value = convert_expr(value.analyze(scope)?, scrutinee_ty)?;
        scope.enter_scope();
        let body = body.analyze(scope)?;
        scope.exit_scope();
        info.ty = Some(TypeDesc::VOID);
        Ok(WhenBranchNode { value, body, info })
    }
}

impl AnalyzeSemantics for WhenNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let WhenNode { scrutinee, branches, else_block, mut info } = self;
        let scrutinee = scrutinee.analyze(scope)?;
        let scrutinee_ty = scrutinee.info.ty.clone().expect("scrutinee analyzed");

        // Duplicate branch values are accepted; the emitted test order makes
        // the first match win.
        let branches = branches
            .into_iter()
            .map(|branch| branch.analyze_against(scope, &scrutinee_ty))
            .collect::<SemResult<Vec<_>>>()?;

        let else_block = match else_block {
            Some(block) => {
                scope.enter_scope();
                let block = block.analyze(scope)?;
                scope.exit_scope();
                block
            }
            None => {
                return Err(SemanticError::new(SemanticErrorKind::MissingElseBranch, info.pos))
            }
        };

        info.ty = Some(TypeDesc::VOID);
        Ok(WhenNode { scrutinee, branches, else_block: Some(else_block), info })
    }
}

impl AnalyzeSemantics for FuncDeclNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let FuncDeclNode { mut name, params, ret_type, body, mut info } = self;
        if !scope.is_global() {
            return Err(SemanticError::new(SemanticErrorKind::NestedFunction, info.pos));
        }
        debug!("analyzing function {}", name.name);

        let ret = resolve_type(&ret_type)?;
        let param_types = params
            .iter()
            .map(|p| resolve_type(&p.param_type))
            .collect::<SemResult<Vec<_>>>()?;
        let func_ty = TypeDesc::func(ret, param_types.clone());

        // Registered before the body is analyzed, so recursive calls resolve.
        let desc = scope.add_ident(IdentDesc::new(&name.name, func_ty.clone()), name.info.pos)?;
        name.info.ty = Some(func_ty.clone());
        name.info.ident = Some(desc.clone());
        info.ty = Some(func_ty);

        scope.enter_function_scope(desc);
        let params = params
            .into_iter()
            .zip(param_types)
            .map(|(param, ty)| {
                let ParamNode { mut name, param_type, mut info } = param;
                let desc = scope.add_ident(IdentDesc::param(&name.name, ty.clone()), name.info.pos)?;
                name.info.ty = Some(ty);
                name.info.ident = Some(desc);
                info.ty = Some(TypeDesc::VOID);
                Ok(ParamNode { name, param_type, info })
            })
            .collect::<SemResult<Vec<_>>>()?;
        let body = body.analyze(scope)?;
        scope.exit_scope();

        Ok(FuncDeclNode { name, params, ret_type, body, info })
    }
}

impl AnalyzeSemantics for ReturnNode {
    fn analyze(self, scope: &mut Namesp) -> SemResult<Self> {
        let ReturnNode { value, mut info } = self;
        let func = scope.current_function().cloned().ok_or_else(|| {
            SemanticError::new(SemanticErrorKind::ReturnOutsideFunction, info.pos)
        })?;
        let ret_ty = match &func.ty {
            TypeDesc::Func { ret, .. } => (**ret).clone(),
            _ => unreachable!("function marker always carries a function type"),
        };

        let value = match value {
            Some(expr) => Some(convert_expr(expr.analyze(scope)?, &ret_ty)?),
            None => {
                if ret_ty != TypeDesc::VOID {
                    return Err(SemanticError::new(
                        SemanticErrorKind::CannotConvert { from: TypeDesc::VOID, to: ret_ty },
                        info.pos,
                    ));
                }
                None
            }
        };
        info.ty = Some(TypeDesc::VOID);
        Ok(ReturnNode { value, info })
    }
}
