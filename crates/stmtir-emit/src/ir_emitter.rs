use crate::config::EmitterConfig;
use crate::emitter::{EmitContext, EmitHelper, EmitResult, Emitter};
use anyhow::Result;
use std::io::Write;
use stmtir_core::{IrNode, IrValue, Op};
use stmtir_lower::LoweredFunction;

/// Prints IR trees as indented s-expressions.
pub struct IrEmitter {
    config: EmitterConfig,
}

impl IrEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Arguments printed on the opening line of a block, before the
    /// indented body.
    fn header_arity(op: Op) -> usize {
        match op {
            Op::With => 2,
            Op::If => 1,
            Op::Repeat => 4,
            _ => 0,
        }
    }

    fn head(&self, node: &IrNode, ctx: &EmitContext) -> String {
        match &node.value {
            IrValue::Op(op) => EmitHelper::paint(ctx, op.name(), "bold_blue"),
            IrValue::Int(v) => EmitHelper::paint(ctx, &v.to_string(), "yellow"),
            IrValue::Symbol(s) => EmitHelper::paint(ctx, s, "cyan"),
        }
    }

    fn suffix(&self, node: &IrNode, ctx: &EmitContext) -> String {
        match &node.typ {
            Some(typ) if self.config.include_types => EmitHelper::paint(ctx, &format!("<{}>", typ), "magenta"),
            _ => String::new(),
        }
    }

    /// Single-line rendering of `node`.
    pub fn flat(&self, node: &IrNode, ctx: &EmitContext) -> String {
        let mut out = String::new();
        if node.args.is_empty() {
            out.push_str(&self.head(node, ctx));
        } else {
            out.push('(');
            out.push_str(&self.head(node, ctx));
            for arg in &node.args {
                out.push(' ');
                out.push_str(&self.flat(arg, ctx));
            }
            out.push(')');
        }
        out.push_str(&self.suffix(node, ctx));
        out
    }

    fn comments(&self, node: &IrNode) -> Vec<String> {
        let verbosity = self.config.verbosity;
        let mut comments = Vec::new();
        if self.config.include_annotations && verbosity.should_print_annotations() {
            if let Some(annotation) = &node.annotation {
                comments.push(annotation.clone());
            }
        }
        if verbosity.should_print_error_msgs() {
            if let Some(msg) = &node.error_msg {
                comments.push(format!("error: {}", msg));
            }
        }
        if verbosity.should_print_source_mappings() {
            if let Some(span) = node.source.filter(|s| s.is_valid()) {
                comments.push(format!("@{}:{}..{}", span.file_id, span.start, span.end()));
            }
        }
        comments
    }

    /// `closing` is appended to the last line written for `node`.
    fn emit_node<W: Write>(&self, node: &IrNode, writer: &mut W, ctx: &mut EmitContext, closing: &str) -> EmitResult {
        for comment in self.comments(node) {
            EmitHelper::write_comment(writer, ctx, &comment)?;
        }

        let op = match node.as_op() {
            Some(op) if op.is_block() && node.args.len() > Self::header_arity(op) => op,
            _ => return EmitHelper::write_line(writer, ctx, &format!("{}{}", self.flat(node, ctx), closing)),
        };

        let (header, body) = node.args.split_at(Self::header_arity(op));
        let mut opening = format!("({}", self.head(node, ctx));
        for arg in header {
            opening.push(' ');
            opening.push_str(&self.flat(arg, ctx));
        }
        EmitHelper::write_line(writer, ctx, &opening)?;

        ctx.indent();
        for (i, child) in body.iter().enumerate() {
            if i + 1 == body.len() {
                let close = format!("){}{}", self.suffix(node, ctx), closing);
                self.emit_node(child, writer, ctx, &close)?;
            } else {
                self.emit_node(child, writer, ctx, "")?;
            }
        }
        ctx.dedent();
        Ok(())
    }

    pub fn emit_function<W: Write>(&self, function: &LoweredFunction, writer: &mut W, ctx: &mut EmitContext) -> EmitResult {
        EmitHelper::write_comment(
            writer,
            ctx,
            &format!("function {} (frame: {} bytes)", function.name, function.frame_size),
        )?;
        self.emit(&function.body, writer, ctx)
    }

    pub fn emit_functions_to_string(&self, functions: &[LoweredFunction]) -> Result<String> {
        let mut buffer = Vec::new();
        let mut ctx = self.new_context();
        for (i, function) in functions.iter().enumerate() {
            if i > 0 {
                writeln!(buffer)?;
            }
            self.emit_function(function, &mut buffer, &mut ctx)?;
        }
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for IrEmitter {
    fn default() -> Self {
        Self::new(EmitterConfig::default())
    }
}

impl Emitter for IrEmitter {
    type Item = IrNode;

    fn emit<W: Write>(&self, item: &IrNode, writer: &mut W, context: &mut EmitContext) -> EmitResult {
        self.emit_node(item, writer, context, "")
    }

    fn new_context(&self) -> EmitContext {
        EmitContext {
            indent_level: 0,
            indent_chars: self.config.indent_style.unit(),
            use_colors: self.config.use_colors,
        }
    }
}
