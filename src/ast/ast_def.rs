// AST definition for the Kotlin-flavored source language.
// Nodes are built by the parser (src/ast/grammar.lalrpop) and decorated in
// place by the semantic analyzer; the MSIL generator only reads them.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::semantic_analyzer::namespace::IdentDesc;
use crate::semantic_analyzer::types::TypeDesc;

/// Source position of a token, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Maps byte offsets reported by the lexer to line/column pairs.
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(src: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    pub fn pos(&self, offset: usize) -> Pos {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let column = offset - self.line_starts[line - 1] + 1;
        Pos { line, column }
    }
}

/// Decoration slots shared by every node. `ty` and `ident` start out empty
/// and are written exactly once during semantic analysis.
#[derive(Debug, Default)]
pub struct NodeInfo {
    pub pos: Option<Pos>,
    pub ty: Option<TypeDesc>,
    pub ident: Option<IdentDesc>,
}

impl NodeInfo {
    pub fn at(pos: Pos) -> Self {
        Self { pos: Some(pos), ty: None, ident: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Lt,
    Ge,
    Le,
    Equals,
    NotEquals,
    LogicalAnd,
    LogicalOr,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
            BinOp::Ge => ">=",
            BinOp::Le => "<=",
            BinOp::Equals => "==",
            BinOp::NotEquals => "!=",
            BinOp::LogicalAnd => "&&",
            BinOp::LogicalOr => "||",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i32),
    Float(f64),
    Str(String),
    Bool(bool),
}

lazy_static! {
    static ref INT_LITERAL: Regex = Regex::new(r"^[0-9]+$").unwrap();
    static ref FLOAT_LITERAL: Regex = Regex::new(r"^[0-9]+\.[0-9]+$").unwrap();
    static ref STR_LITERAL: Regex = Regex::new(r#"^"(?s).*"$"#).unwrap();
}

#[derive(Debug)]
pub struct LiteralNode {
    /// Raw lexeme as written in the source.
    pub literal: String,
    pub value: LiteralValue,
    pub info: NodeInfo,
}

impl LiteralNode {
    /// Classifies the raw lexeme into a typed value.
    pub fn from_literal(literal: &str, pos: Pos) -> Self {
        let value = if literal == "true" {
            LiteralValue::Bool(true)
        } else if literal == "false" {
            LiteralValue::Bool(false)
        } else if INT_LITERAL.is_match(literal) {
            LiteralValue::Int(literal.parse().unwrap())
        } else if FLOAT_LITERAL.is_match(literal) {
            LiteralValue::Float(literal.parse().unwrap())
        } else if STR_LITERAL.is_match(literal) {
            LiteralValue::Str(unescape(literal))
        } else {
            unreachable!("lexer produced an unknown literal: {}", literal)
        };
        Self { literal: literal.to_string(), value, info: NodeInfo::at(pos) }
    }

    pub fn bool_true(pos: Pos) -> Self {
        Self::from_literal("true", pos)
    }
}

fn unescape(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[derive(Debug)]
pub struct IdentNode {
    pub name: String,
    pub info: NodeInfo,
}

impl IdentNode {
    pub fn new(name: &str, pos: Pos) -> Self {
        Self { name: name.to_string(), info: NodeInfo::at(pos) }
    }
}

/// Type annotation as written in the source, e.g. `Int` or `Array<Array<Int>>`.
#[derive(Debug)]
pub struct TypeNode {
    pub name: String,
    pub arg: Option<Box<TypeNode>>,
    pub info: NodeInfo,
}

impl TypeNode {
    pub fn new(name: String, arg: Option<TypeNode>, pos: Pos) -> Self {
        Self { name, arg: arg.map(Box::new), info: NodeInfo::at(pos) }
    }

    pub fn type_text(&self) -> String {
        match &self.arg {
            Some(arg) => format!("{}<{}>", self.name, arg.type_text()),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug)]
pub struct BinOpNode {
    pub op: BinOp,
    pub left: Box<ExprNode>,
    pub right: Box<ExprNode>,
    pub info: NodeInfo,
}

/// Synthetic node wrapping an expression with an implicit conversion.
/// Its resolved type is always the conversion target.
#[derive(Debug)]
pub struct TypeConvertNode {
    pub expr: Box<ExprNode>,
    pub info: NodeInfo,
}

impl TypeConvertNode {
    pub fn wrap(expr: ExprNode, target: TypeDesc) -> Self {
        let info = NodeInfo { pos: expr.pos(), ty: Some(target), ident: None };
        Self { expr: Box::new(expr), info }
    }
}

#[derive(Debug)]
pub struct CallNode {
    pub func: IdentNode,
    pub args: Vec<ExprNode>,
    pub info: NodeInfo,
}

impl CallNode {
    pub fn new(func: IdentNode, args: Vec<ExprNode>, pos: Pos) -> Self {
        Self { func, args, info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct ArrayIndexNode {
    pub array: IdentNode,
    pub index: Box<ExprNode>,
    pub info: NodeInfo,
}

impl ArrayIndexNode {
    pub fn new(array: IdentNode, index: ExprNode, pos: Pos) -> Self {
        Self { array, index: Box::new(index), info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub enum ExprNode {
    Literal(LiteralNode),
    Ident(IdentNode),
    BinOp(Box<BinOpNode>),
    Call(CallNode),
    ArrayIndex(Box<ArrayIndexNode>),
    TypeConvert(Box<TypeConvertNode>),
}

impl ExprNode {
    pub fn bin_op(op: BinOp, left: ExprNode, right: ExprNode, pos: Pos) -> Self {
        ExprNode::BinOp(Box::new(BinOpNode {
            op,
            left: Box::new(left),
            right: Box::new(right),
            info: NodeInfo::at(pos),
        }))
    }

    pub fn bool_true(pos: Pos) -> Self {
        ExprNode::Literal(LiteralNode::bool_true(pos))
    }

    pub fn info(&self) -> &NodeInfo {
        match self {
            ExprNode::Literal(n) => &n.info,
            ExprNode::Ident(n) => &n.info,
            ExprNode::BinOp(n) => &n.info,
            ExprNode::Call(n) => &n.info,
            ExprNode::ArrayIndex(n) => &n.info,
            ExprNode::TypeConvert(n) => &n.info,
        }
    }

    pub fn pos(&self) -> Option<Pos> {
        self.info().pos
    }

    pub fn resolved_type(&self) -> Option<&TypeDesc> {
        self.info().ty.as_ref()
    }
}

#[derive(Debug)]
pub struct VarDeclNode {
    pub name: IdentNode,
    pub var_type: TypeNode,
    pub init: Option<ExprNode>,
    pub info: NodeInfo,
}

impl VarDeclNode {
    pub fn new(name: IdentNode, var_type: TypeNode, init: Option<ExprNode>, pos: Pos) -> Self {
        Self { name, var_type, init, info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct AssignNode {
    pub target: ExprNode,
    pub value: ExprNode,
    pub info: NodeInfo,
}

impl AssignNode {
    pub fn new(target: ExprNode, value: ExprNode, pos: Pos) -> Self {
        Self { target, value, info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct IfNode {
    pub cond: ExprNode,
    pub then_block: StmtListNode,
    /// Either a plain else block or the next `if` of an `else if` chain.
    pub else_stmt: Option<Box<StmtNode>>,
    pub info: NodeInfo,
}

impl IfNode {
    pub fn new(cond: ExprNode, then_block: StmtListNode, else_stmt: Option<StmtNode>, pos: Pos) -> Self {
        Self { cond, then_block, else_stmt: else_stmt.map(Box::new), info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct WhileNode {
    pub cond: ExprNode,
    pub body: StmtListNode,
    pub info: NodeInfo,
}

impl WhileNode {
    pub fn new(cond: ExprNode, body: StmtListNode, pos: Pos) -> Self {
        Self { cond, body, info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct ForNode {
    pub init: StmtListNode,
    pub cond: ExprNode,
    pub step: StmtListNode,
    pub body: StmtListNode,
    pub info: NodeInfo,
}

impl ForNode {
    pub fn new(init: StmtListNode, cond: ExprNode, step: StmtListNode, body: StmtListNode, pos: Pos) -> Self {
        Self { init, cond, step, body, info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct ForRangeNode {
    pub var: IdentNode,
    pub start: ExprNode,
    pub end: ExprNode,
    pub body: StmtListNode,
    pub info: NodeInfo,
}

impl ForRangeNode {
    pub fn new(var: IdentNode, start: ExprNode, end: ExprNode, body: StmtListNode, pos: Pos) -> Self {
        Self { var, start, end, body, info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct WhenBranchNode {
    pub value: ExprNode,
    pub body: StmtListNode,
    pub info: NodeInfo,
}

impl WhenBranchNode {
    pub fn new(value: ExprNode, body: StmtListNode, pos: Pos) -> Self {
        Self { value, body, info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct WhenNode {
    pub scrutinee: IdentNode,
    pub branches: Vec<WhenBranchNode>,
    pub else_block: Option<StmtListNode>,
    pub info: NodeInfo,
}

impl WhenNode {
    pub fn new(
        scrutinee: IdentNode,
        branches: Vec<WhenBranchNode>,
        else_block: Option<StmtListNode>,
        pos: Pos,
    ) -> Self {
        Self { scrutinee, branches, else_block, info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct ParamNode {
    pub name: IdentNode,
    pub param_type: TypeNode,
    pub info: NodeInfo,
}

impl ParamNode {
    pub fn new(name: IdentNode, param_type: TypeNode, pos: Pos) -> Self {
        Self { name, param_type, info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct FuncDeclNode {
    pub name: IdentNode,
    pub params: Vec<ParamNode>,
    pub ret_type: TypeNode,
    pub body: StmtListNode,
    pub info: NodeInfo,
}

impl FuncDeclNode {
    pub fn new(name: IdentNode, params: Vec<ParamNode>, ret_type: TypeNode, body: StmtListNode, pos: Pos) -> Self {
        Self { name, params, ret_type, body, info: NodeInfo::at(pos) }
    }

    /// `fun f(..): T = expr` is a block body with a single return.
    pub fn expr_bodied(
        name: IdentNode,
        params: Vec<ParamNode>,
        ret_type: TypeNode,
        expr: ExprNode,
        pos: Pos,
        expr_pos: Pos,
    ) -> Self {
        let body = StmtListNode::new(vec![StmtNode::Return(ReturnNode::new(Some(expr), expr_pos))]);
        Self::new(name, params, ret_type, body, pos)
    }
}

#[derive(Debug)]
pub struct ReturnNode {
    pub value: Option<ExprNode>,
    pub info: NodeInfo,
}

impl ReturnNode {
    pub fn new(value: Option<ExprNode>, pos: Pos) -> Self {
        Self { value, info: NodeInfo::at(pos) }
    }
}

#[derive(Debug)]
pub struct StmtListNode {
    pub stmts: Vec<StmtNode>,
    pub info: NodeInfo,
}

impl StmtListNode {
    pub fn new(stmts: Vec<StmtNode>) -> Self {
        Self { stmts, info: NodeInfo::default() }
    }

    pub fn single(stmt: StmtNode) -> Self {
        Self::new(vec![stmt])
    }
}

#[derive(Debug)]
pub enum StmtNode {
    VarDecl(VarDeclNode),
    Assign(AssignNode),
    Call(CallNode),
    If(Box<IfNode>),
    While(Box<WhileNode>),
    For(Box<ForNode>),
    ForRange(Box<ForRangeNode>),
    When(WhenNode),
    FuncDecl(FuncDeclNode),
    Return(ReturnNode),
    Block(StmtListNode),
}

/// Pretty tree rendering for diagnostics. Pure: rendering the same tree
/// twice yields the same lines.
pub trait TreeNode {
    fn label(&self) -> String;
    fn children(&self) -> Vec<&dyn TreeNode>;

    fn tree_lines(&self) -> Vec<String> {
        let mut lines = vec![self.label()];
        let children = self.children();
        let last = children.len().saturating_sub(1);
        for (i, child) in children.iter().enumerate() {
            let (head, tail) = if i == last { ("└ ", "  ") } else { ("├ ", "│ ") };
            for (j, line) in child.tree_lines().into_iter().enumerate() {
                let prefix = if j == 0 { head } else { tail };
                lines.push(format!("{}{}", prefix, line));
            }
        }
        lines
    }
}

fn typed_label(text: &str, info: &NodeInfo) -> String {
    match &info.ty {
        Some(ty) => format!("{} : {}", text, ty),
        None => text.to_string(),
    }
}

impl TreeNode for LiteralNode {
    fn label(&self) -> String {
        typed_label(&self.literal, &self.info)
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        Vec::new()
    }
}

impl TreeNode for IdentNode {
    fn label(&self) -> String {
        match &self.info.ident {
            Some(desc) => format!("{} : {}", self.name, desc),
            None => self.name.clone(),
        }
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        Vec::new()
    }
}

impl TreeNode for TypeNode {
    fn label(&self) -> String {
        self.type_text()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        Vec::new()
    }
}

impl TreeNode for BinOpNode {
    fn label(&self) -> String {
        typed_label(&self.op.to_string(), &self.info)
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }
}

impl TreeNode for TypeConvertNode {
    fn label(&self) -> String {
        typed_label("convert", &self.info)
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        vec![self.expr.as_ref()]
    }
}

impl TreeNode for CallNode {
    fn label(&self) -> String {
        typed_label("call", &self.info)
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        let mut out: Vec<&dyn TreeNode> = vec![&self.func];
        out.extend(self.args.iter().map(|a| a as &dyn TreeNode));
        out
    }
}

impl TreeNode for ArrayIndexNode {
    fn label(&self) -> String {
        typed_label("[]", &self.info)
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        vec![&self.array, self.index.as_ref()]
    }
}

impl TreeNode for ExprNode {
    fn label(&self) -> String {
        self.as_tree().label()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        self.as_tree().children()
    }
}

impl ExprNode {
    fn as_tree(&self) -> &dyn TreeNode {
        match self {
            ExprNode::Literal(n) => n,
            ExprNode::Ident(n) => n,
            ExprNode::BinOp(n) => n.as_ref(),
            ExprNode::Call(n) => n,
            ExprNode::ArrayIndex(n) => n.as_ref(),
            ExprNode::TypeConvert(n) => n.as_ref(),
        }
    }
}

impl TreeNode for VarDeclNode {
    fn label(&self) -> String {
        "var".to_string()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        let mut out: Vec<&dyn TreeNode> = vec![&self.name, &self.var_type];
        if let Some(init) = &self.init {
            out.push(init);
        }
        out
    }
}

impl TreeNode for AssignNode {
    fn label(&self) -> String {
        "=".to_string()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        vec![&self.target, &self.value]
    }
}

impl TreeNode for IfNode {
    fn label(&self) -> String {
        "if".to_string()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        let mut out: Vec<&dyn TreeNode> = vec![&self.cond, &self.then_block];
        if let Some(els) = &self.else_stmt {
            out.push(els.as_ref());
        }
        out
    }
}

impl TreeNode for WhileNode {
    fn label(&self) -> String {
        "while".to_string()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        vec![&self.cond, &self.body]
    }
}

impl TreeNode for ForNode {
    fn label(&self) -> String {
        "for".to_string()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        vec![&self.init, &self.cond, &self.step, &self.body]
    }
}

impl TreeNode for ForRangeNode {
    fn label(&self) -> String {
        format!("for {} in", self.var.name)
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        vec![&self.start, &self.end, &self.body]
    }
}

impl TreeNode for WhenBranchNode {
    fn label(&self) -> String {
        "->".to_string()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        vec![&self.value, &self.body]
    }
}

impl TreeNode for WhenNode {
    fn label(&self) -> String {
        "when".to_string()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        let mut out: Vec<&dyn TreeNode> = vec![&self.scrutinee];
        out.extend(self.branches.iter().map(|b| b as &dyn TreeNode));
        if let Some(els) = &self.else_block {
            out.push(els);
        }
        out
    }
}

impl TreeNode for FuncDeclNode {
    fn label(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name.name, p.param_type.type_text()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("fun {}({}): {}", self.name.name, params, self.ret_type.type_text())
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        vec![&self.body]
    }
}

impl TreeNode for ReturnNode {
    fn label(&self) -> String {
        "return".to_string()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        match &self.value {
            Some(value) => vec![value],
            None => Vec::new(),
        }
    }
}

impl TreeNode for StmtListNode {
    fn label(&self) -> String {
        "...".to_string()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        self.stmts.iter().map(|s| s as &dyn TreeNode).collect()
    }
}

impl TreeNode for StmtNode {
    fn label(&self) -> String {
        self.as_tree().label()
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        self.as_tree().children()
    }
}

impl StmtNode {
    fn as_tree(&self) -> &dyn TreeNode {
        match self {
            StmtNode::VarDecl(n) => n,
            StmtNode::Assign(n) => n,
            StmtNode::Call(n) => n,
            StmtNode::If(n) => n.as_ref(),
            StmtNode::While(n) => n.as_ref(),
            StmtNode::For(n) => n.as_ref(),
            StmtNode::ForRange(n) => n.as_ref(),
            StmtNode::When(n) => n,
            StmtNode::FuncDecl(n) => n,
            StmtNode::Return(n) => n,
            StmtNode::Block(n) => n,
        }
    }
}
