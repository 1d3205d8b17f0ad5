// Instruction buffer with forward-referenced labels.
//
// Instructions are collected as (opcode, operands) lines; a label is an id
// into the builder's table and gets its index in `code`, the finalization
// pass. Only lines that carry a label consume an index, so placeholder lines
// used purely as branch targets do not shift the numbering.

use super::{GenError, GenResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLabel(usize);

#[derive(Debug, Clone)]
pub enum Operand {
    Int(i32),
    Index(usize),
    Text(String),
    Label(CodeLabel),
}

#[derive(Debug)]
pub struct CodeLine {
    pub label: Option<CodeLabel>,
    pub code: String,
    pub operands: Vec<Operand>,
}

pub struct MsilBuilder {
    lines: Vec<CodeLine>,
    labels: Vec<Option<usize>>,
}

impl MsilBuilder {
    pub fn new() -> Self {
        Self { lines: Vec::new(), labels: Vec::new() }
    }

    pub fn new_label(&mut self) -> CodeLabel {
        self.labels.push(None);
        CodeLabel(self.labels.len() - 1)
    }

    /// Raw line, used for directives and braces.
    pub fn add(&mut self, code: &str) {
        self.add_with(code, Vec::new());
    }

    pub fn add_with(&mut self, code: &str, operands: Vec<Operand>) {
        self.lines.push(CodeLine { label: None, code: code.to_string(), operands });
    }

    /// Places `label` on an empty line at the current position.
    pub fn place_label(&mut self, label: CodeLabel) {
        self.lines.push(CodeLine { label: Some(label), code: String::new(), operands: Vec::new() });
    }

    fn inst(&mut self, opcode: &str, operands: Vec<Operand>) {
        self.add_with(&format!("    {}", opcode), operands);
    }

    pub fn op(&mut self, opcode: &str) {
        self.inst(opcode, Vec::new());
    }

    pub fn ldc_i4(&mut self, value: i32) {
        self.inst("ldc.i4", vec![Operand::Int(value)]);
    }

    pub fn ldc_r8(&mut self, value: f64) {
        self.inst("ldc.r8", vec![Operand::Text(format!("{:?}", value))]);
    }

    pub fn ldstr(&mut self, value: &str) {
        self.inst("ldstr", vec![Operand::Text(format!("\"{}\"", escape(value)))]);
    }

    pub fn ldloc(&mut self, index: usize) {
        self.inst("ldloc", vec![Operand::Index(index)]);
    }

    pub fn stloc(&mut self, index: usize) {
        self.inst("stloc", vec![Operand::Index(index)]);
    }

    pub fn ldarg(&mut self, index: usize) {
        self.inst("ldarg", vec![Operand::Index(index)]);
    }

    pub fn starg(&mut self, index: usize) {
        self.inst("starg", vec![Operand::Index(index)]);
    }

    pub fn ldsfld(&mut self, ty: &str, index: usize) {
        self.inst("ldsfld", vec![Operand::Text(format!("{} Program::_gl{}", ty, index))]);
    }

    pub fn stsfld(&mut self, ty: &str, index: usize) {
        self.inst("stsfld", vec![Operand::Text(format!("{} Program::_gl{}", ty, index))]);
    }

    pub fn br(&mut self, label: CodeLabel) {
        self.inst("br", vec![Operand::Label(label)]);
    }

    pub fn brtrue(&mut self, label: CodeLabel) {
        self.inst("brtrue", vec![Operand::Label(label)]);
    }

    pub fn call(&mut self, signature: &str) {
        self.inst("call", vec![Operand::Text(signature.to_string())]);
    }

    pub fn ret(&mut self) {
        self.op("ret");
    }

    pub fn blank(&mut self) {
        self.add("");
    }

    /// Finalization: number the labeled lines, then render everything.
    pub fn code(&mut self) -> GenResult<Vec<String>> {
        let mut index = 0;
        for line in &self.lines {
            if let Some(label) = line.label {
                self.labels[label.0] = Some(index);
                index += 1;
            }
        }
        self.lines.iter().map(|line| self.render_line(line)).collect()
    }

    fn label_name(&self, label: CodeLabel) -> GenResult<String> {
        match self.labels[label.0] {
            Some(index) => Ok(format!("IL_{}", index)),
            None => Err(GenError::UnresolvedLabel),
        }
    }

    fn render_line(&self, line: &CodeLine) -> GenResult<String> {
        let mut out = String::new();
        if let Some(label) = line.label {
            out.push_str(&self.label_name(label)?);
            out.push(':');
            if !line.code.is_empty() {
                out.push(' ');
            }
        }
        out.push_str(&line.code);
        for operand in &line.operands {
            out.push(' ');
            match operand {
                Operand::Int(v) => out.push_str(&v.to_string()),
                Operand::Index(v) => out.push_str(&v.to_string()),
                Operand::Text(v) => out.push_str(v),
                Operand::Label(l) => out.push_str(&self.label_name(*l)?),
            }
        }
        Ok(out)
    }
}

impl Default for MsilBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}
