// MSIL emission: a second walk over the analyzed tree. No type checking
// happens here; the walk trusts the decorations and fails with a GenError
// when one is missing.

use log::debug;

use crate::ast::ast_def::*;
use crate::semantic_analyzer::namespace::{IdentDesc, StorageClass};
use crate::semantic_analyzer::types::{BaseType, TypeDesc};
use super::code_builder::MsilBuilder;
use super::{GenError, GenResult};

fn msil_base_name(base: BaseType) -> &'static str {
    match base {
        BaseType::Void => "void",
        BaseType::Int => "int32",
        BaseType::Float => "float32",
        BaseType::Bool => "int32",
        BaseType::Str => "string",
    }
}

fn msil_type(ty: &TypeDesc) -> String {
    match ty {
        TypeDesc::Simple { base, array_level } => {
            let mut out = msil_base_name(*base).to_string();
            for _ in 0..*array_level {
                out.push_str("[]");
            }
            out
        }
        TypeDesc::Func { ret, .. } => msil_type(ret),
    }
}

fn elem_opcode(prefix: &str, base: BaseType) -> String {
    let suffix = match base {
        BaseType::Int | BaseType::Bool => "i4",
        BaseType::Float => "r8",
        BaseType::Str | BaseType::Void => "ref",
    };
    format!("{}.{}", prefix, suffix)
}

fn convert_call(from: BaseType, to: BaseType) -> String {
    let name = match (from, to) {
        (BaseType::Int, BaseType::Float) => "intToFloat",
        (BaseType::Int, BaseType::Bool) => "intToBoolean",
        (BaseType::Int, BaseType::Str) => "intToString",
        (BaseType::Float, BaseType::Str) => "floatToString",
        (BaseType::Bool, BaseType::Str) => "booleanToString",
        _ => unreachable!("conversion outside the directed table: {} to {}", from, to),
    };
    format!(
        "{} class Runtime::{}({})",
        msil_base_name(to),
        name,
        msil_base_name(from)
    )
}

fn resolved_type(expr: &ExprNode) -> GenResult<&TypeDesc> {
    expr.resolved_type().ok_or(GenError::UnresolvedType)
}

fn resolved_ident(node: &IdentNode) -> GenResult<&IdentDesc> {
    node.info.ident.as_ref().ok_or(GenError::UnresolvedIdent)
}

fn is_string(ty: &TypeDesc) -> bool {
    ty.scalar_base() == Some(BaseType::Str)
}

fn emit_load(gen: &mut MsilBuilder, ident: &IdentDesc) {
    match ident.storage {
        StorageClass::Local => gen.ldloc(ident.index),
        StorageClass::Param => gen.ldarg(ident.index),
        StorageClass::Global | StorageClass::GlobalLocal => {
            gen.ldsfld(&msil_type(&ident.ty), ident.index)
        }
    }
}

fn emit_store(gen: &mut MsilBuilder, ident: &IdentDesc) {
    match ident.storage {
        StorageClass::Local => gen.stloc(ident.index),
        StorageClass::Param => gen.starg(ident.index),
        StorageClass::Global | StorageClass::GlobalLocal => {
            gen.stsfld(&msil_type(&ident.ty), ident.index)
        }
    }
}

pub trait GenerateMsil {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()>;
}

impl GenerateMsil for ExprNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        match self {
            ExprNode::Literal(n) => n.generate(gen),
            ExprNode::Ident(n) => n.generate(gen),
            ExprNode::BinOp(n) => n.generate(gen),
            ExprNode::Call(n) => n.generate(gen),
            ExprNode::ArrayIndex(n) => n.generate(gen),
            ExprNode::TypeConvert(n) => n.generate(gen),
        }
    }
}

impl GenerateMsil for LiteralNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        match &self.value {
            LiteralValue::Int(v) => gen.ldc_i4(*v),
            LiteralValue::Float(v) => gen.ldc_r8(*v),
            LiteralValue::Str(v) => gen.ldstr(v),
            LiteralValue::Bool(v) => gen.ldc_i4(if *v { 1 } else { 0 }),
        }
        Ok(())
    }
}

impl GenerateMsil for IdentNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        emit_load(gen, resolved_ident(self)?);
        Ok(())
    }
}

impl GenerateMsil for BinOpNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        self.left.generate(gen)?;
        self.right.generate(gen)?;
        let string_operands = is_string(resolved_type(&self.left)?);

        match self.op {
            BinOp::Add => {
                if string_operands {
                    gen.call("string [mscorlib]System.String::Concat(string, string)");
                } else {
                    gen.op("add");
                }
            }
            BinOp::Sub => gen.op("sub"),
            BinOp::Mul => gen.op("mul"),
            BinOp::Div => gen.op("div"),
            BinOp::Equals => {
                if string_operands {
                    gen.call("bool [mscorlib]System.String::op_Equality(string, string)");
                } else {
                    gen.op("ceq");
                }
            }
            BinOp::NotEquals => {
                if string_operands {
                    gen.call("bool [mscorlib]System.String::op_Inequality(string, string)");
                } else {
                    gen.op("ceq");
                    gen.ldc_i4(0);
                    gen.op("ceq");
                }
            }
            BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le => {
                // String ordering goes through Compare and then behaves like
                // an integer comparison against zero.
                if string_operands {
                    gen.call("int32 [mscorlib]System.String::Compare(string, string)");
                    gen.ldc_i4(0);
                }
                match self.op {
                    BinOp::Gt => gen.op("cgt"),
                    BinOp::Lt => gen.op("clt"),
                    // The target has no direct >= / <=; negate the opposite.
                    BinOp::Ge => {
                        gen.op("clt");
                        gen.ldc_i4(0);
                        gen.op("ceq");
                    }
                    BinOp::Le => {
                        gen.op("cgt");
                        gen.ldc_i4(0);
                        gen.op("ceq");
                    }
                    _ => unreachable!(),
                }
            }
            BinOp::LogicalAnd => gen.op("and"),
            BinOp::LogicalOr => gen.op("or"),
        }
        Ok(())
    }
}

impl GenerateMsil for TypeConvertNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        self.expr.generate(gen)?;
        let from = resolved_type(&self.expr)?
            .scalar_base()
            .ok_or(GenError::UnresolvedType)?;
        let to = self
            .info
            .ty
            .as_ref()
            .and_then(|ty| ty.scalar_base())
            .ok_or(GenError::UnresolvedType)?;
        gen.call(&convert_call(from, to));
        Ok(())
    }
}

impl GenerateMsil for CallNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        for arg in &self.args {
            arg.generate(gen)?;
        }
        let desc = resolved_ident(&self.func)?;
        let (ret, params) = match &desc.ty {
            TypeDesc::Func { ret, params } => (ret.as_ref(), params),
            _ => return Err(GenError::UnresolvedIdent),
        };
        let class = if desc.built_in { "Runtime" } else { "Program" };
        let param_sig = params.iter().map(msil_type).collect::<Vec<_>>().join(", ");
        gen.call(&format!("{} class {}::{}({})", msil_type(ret), class, desc.name, param_sig));
        Ok(())
    }
}

impl GenerateMsil for ArrayIndexNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        self.array.generate(gen)?;
        self.index.generate(gen)?;
        let elem = self
            .info
            .ty
            .as_ref()
            .and_then(|ty| ty.base_type())
            .ok_or(GenError::UnresolvedType)?;
        gen.op(&elem_opcode("ldelem", elem));
        Ok(())
    }
}

impl GenerateMsil for StmtListNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        for stmt in &self.stmts {
            stmt.generate(gen)?;
        }
        Ok(())
    }
}

impl GenerateMsil for StmtNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        match self {
            StmtNode::VarDecl(n) => n.generate(gen),
            StmtNode::Assign(n) => n.generate(gen),
            StmtNode::Call(n) => {
                n.generate(gen)?;
                // A discarded non-void result would leak on the stack.
                let ret = n.info.ty.as_ref().ok_or(GenError::UnresolvedType)?;
                if *ret != TypeDesc::VOID {
                    gen.op("pop");
                }
                Ok(())
            }
            StmtNode::If(n) => n.generate(gen),
            StmtNode::While(n) => n.generate(gen),
            StmtNode::For(n) => n.generate(gen),
            StmtNode::ForRange(n) => n.generate(gen),
            StmtNode::When(n) => n.generate(gen),
            // Functions are emitted by the program pass, never inline.
            StmtNode::FuncDecl(_) => Ok(()),
            StmtNode::Return(n) => n.generate(gen),
            StmtNode::Block(n) => n.generate(gen),
        }
    }
}

impl GenerateMsil for VarDeclNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        if let Some(init) = &self.init {
            init.generate(gen)?;
            emit_store(gen, resolved_ident(&self.name)?);
        }
        Ok(())
    }
}

impl GenerateMsil for AssignNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        match &self.target {
            ExprNode::Ident(ident) => {
                self.value.generate(gen)?;
                emit_store(gen, resolved_ident(ident)?);
            }
            ExprNode::ArrayIndex(index) => {
                index.array.generate(gen)?;
                index.index.generate(gen)?;
                self.value.generate(gen)?;
                let elem = index
                    .info
                    .ty
                    .as_ref()
                    .and_then(|ty| ty.base_type())
                    .ok_or(GenError::UnresolvedType)?;
                gen.op(&elem_opcode("stelem", elem));
            }
            _ => unreachable!("assignment target is an identifier or an element"),
        }
        Ok(())
    }
}

impl GenerateMsil for IfNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        self.cond.generate(gen)?;
        gen.ldc_i4(0);
        gen.op("ceq");
        let else_label = gen.new_label();
        let end_label = gen.new_label();
        gen.brtrue(else_label);
        self.then_block.generate(gen)?;
        gen.br(end_label);
        gen.place_label(else_label);
        if let Some(else_stmt) = &self.else_stmt {
            else_stmt.generate(gen)?;
        }
        gen.place_label(end_label);
        Ok(())
    }
}

impl GenerateMsil for WhileNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        let start_label = gen.new_label();
        let end_label = gen.new_label();
        gen.place_label(start_label);
        self.cond.generate(gen)?;
        gen.ldc_i4(0);
        gen.op("ceq");
        gen.brtrue(end_label);
        self.body.generate(gen)?;
        gen.br(start_label);
        gen.place_label(end_label);
        Ok(())
    }
}

impl GenerateMsil for ForNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        self.init.generate(gen)?;
        let start_label = gen.new_label();
        let end_label = gen.new_label();
        gen.place_label(start_label);
        self.cond.generate(gen)?;
        gen.ldc_i4(0);
        gen.op("ceq");
        gen.brtrue(end_label);
        self.body.generate(gen)?;
        self.step.generate(gen)?;
        gen.br(start_label);
        gen.place_label(end_label);
        Ok(())
    }
}

impl GenerateMsil for ForRangeNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        let var = resolved_ident(&self.var)?.clone();
        self.start.generate(gen)?;
        emit_store(gen, &var);

        let start_label = gen.new_label();
        let end_label = gen.new_label();
        gen.place_label(start_label);
        emit_load(gen, &var);
        self.end.generate(gen)?;
        gen.op("cgt");
        gen.brtrue(end_label);
        self.body.generate(gen)?;
        emit_load(gen, &var);
        gen.ldc_i4(1);
        gen.op("add");
        emit_store(gen, &var);
        gen.br(start_label);
        gen.place_label(end_label);
        Ok(())
    }
}

impl GenerateMsil for WhenNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        let scrutinee = resolved_ident(&self.scrutinee)?.clone();
        let string_scrutinee = is_string(&scrutinee.ty);
        let end_label = gen.new_label();

        // Tests first, in source order, so the first matching branch wins.
        let mut branch_labels = Vec::with_capacity(self.branches.len());
        for branch in &self.branches {
            let label = gen.new_label();
            emit_load(gen, &scrutinee);
            branch.value.generate(gen)?;
            if string_scrutinee {
                gen.call("bool [mscorlib]System.String::op_Equality(string, string)");
            } else {
                gen.op("ceq");
            }
            gen.brtrue(label);
            branch_labels.push(label);
        }

        // No test matched: fall through into the else block.
        if let Some(else_block) = &self.else_block {
            else_block.generate(gen)?;
        }
        gen.br(end_label);

        for (branch, label) in self.branches.iter().zip(branch_labels) {
            gen.place_label(label);
            branch.body.generate(gen)?;
            gen.br(end_label);
        }
        gen.place_label(end_label);
        Ok(())
    }
}

impl GenerateMsil for ReturnNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        if let Some(value) = &self.value {
            value.generate(gen)?;
        }
        gen.ret();
        Ok(())
    }
}

impl GenerateMsil for FuncDeclNode {
    fn generate(&self, gen: &mut MsilBuilder) -> GenResult<()> {
        let desc = resolved_ident(&self.name)?;
        let (ret, param_types) = match &desc.ty {
            TypeDesc::Func { ret, params } => (ret.as_ref(), params),
            _ => return Err(GenError::UnresolvedIdent),
        };
        debug!("emitting method {}", desc.name);

        let params_sig = self
            .params
            .iter()
            .zip(param_types)
            .map(|(param, ty)| format!("{} {}", msil_type(ty), param.name.name))
            .collect::<Vec<_>>()
            .join(", ");
        gen.add(&format!(
            "  .method public static {} {}({}) cil managed",
            msil_type(ret),
            desc.name,
            params_sig
        ));
        gen.add("  {");

        let mut decls = Vec::new();
        collect_declared_idents(&self.body, &mut decls);
        let mut locals: Vec<_> = decls
            .into_iter()
            .filter(|d| d.storage == StorageClass::Local)
            .collect();
        locals.sort_by_key(|d| d.index);
        if !locals.is_empty() {
            let list = locals
                .iter()
                .map(|d| format!("[{}] {} {}", d.index, msil_type(&d.ty), d.name))
                .collect::<Vec<_>>()
                .join(", ");
            gen.add(&format!("    .locals init ({})", list));
        }

        self.body.generate(gen)?;
        gen.ret();
        gen.add("  }");
        Ok(())
    }
}

/// Collects the descriptor of every variable declaration in the subtree,
/// including loop variables introduced by range loops. Undecorated
/// declarations are skipped; the emitting walk reports them.
fn collect_declared_idents(stmts: &StmtListNode, out: &mut Vec<IdentDesc>) {
    for stmt in &stmts.stmts {
        collect_stmt(stmt, out);
    }
}

fn collect_stmt(stmt: &StmtNode, out: &mut Vec<IdentDesc>) {
    match stmt {
        StmtNode::VarDecl(n) => {
            if let Some(desc) = &n.name.info.ident {
                out.push(desc.clone());
            }
        }
        StmtNode::If(n) => {
            collect_declared_idents(&n.then_block, out);
            if let Some(else_stmt) = &n.else_stmt {
                collect_stmt(else_stmt, out);
            }
        }
        StmtNode::While(n) => collect_declared_idents(&n.body, out),
        StmtNode::For(n) => {
            collect_declared_idents(&n.init, out);
            collect_declared_idents(&n.step, out);
            collect_declared_idents(&n.body, out);
        }
        StmtNode::ForRange(n) => {
            if let Some(desc) = &n.var.info.ident {
                out.push(desc.clone());
            }
            collect_declared_idents(&n.body, out);
        }
        StmtNode::When(n) => {
            for branch in &n.branches {
                collect_declared_idents(&branch.body, out);
            }
            if let Some(else_block) = &n.else_block {
                collect_declared_idents(else_block, out);
            }
        }
        StmtNode::FuncDecl(n) => collect_declared_idents(&n.body, out),
        StmtNode::Block(n) => collect_declared_idents(n, out),
        StmtNode::Assign(_) | StmtNode::Call(_) | StmtNode::Return(_) => {}
    }
}

/// Assembles the whole program: assembly/class header, static field
/// directives, function methods, then the entry-point method holding the
/// top-level statements in source order.
pub fn generate_program(prog: &StmtListNode) -> GenResult<Vec<String>> {
    let mut gen = MsilBuilder::new();
    gen.add(".assembly program");
    gen.add("{");
    gen.add("}");
    gen.add(".class public Program");
    gen.add("{");

    let mut decls = Vec::new();
    collect_declared_idents(prog, &mut decls);
    for desc in decls
        .iter()
        .filter(|d| matches!(d.storage, StorageClass::Global | StorageClass::GlobalLocal))
    {
        gen.add(&format!(
            "  .field public static {} _gl{}",
            msil_type(&desc.ty),
            desc.index
        ));
    }

    for stmt in &prog.stmts {
        if let StmtNode::FuncDecl(func) = stmt {
            func.generate(&mut gen)?;
        }
    }

    gen.blank();
    gen.add("  .method public static void Main() cil managed");
    gen.add("  {");
    gen.add("    .entrypoint");
    for stmt in &prog.stmts {
        if !matches!(stmt, StmtNode::FuncDecl(_)) {
            stmt.generate(&mut gen)?;
        }
    }
    gen.ret();
    gen.add("  }");
    gen.add("}");

    gen.code()
}
