use anyhow::Result;
use std::io::Write;

pub type EmitResult = Result<()>;

#[derive(Debug, Clone)]
pub struct EmitContext {
    pub indent_level: usize,
    pub indent_chars: String,
    pub use_colors: bool,
}

impl EmitContext {
    pub fn new() -> Self {
        Self {
            indent_level: 0,
            indent_chars: "    ".to_string(),
            use_colors: true,
        }
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    pub fn get_indent(&self) -> String {
        self.indent_chars.repeat(self.indent_level)
    }

    pub fn nested(&self) -> Self {
        let mut ctx = self.clone();
        ctx.indent();
        ctx
    }
}

impl Default for EmitContext {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Emitter {
    type Item;

    fn emit<W: Write>(&self, item: &Self::Item, writer: &mut W, context: &mut EmitContext) -> EmitResult;

    fn new_context(&self) -> EmitContext {
        EmitContext::new()
    }

    fn emit_to_string(&self, item: &Self::Item) -> Result<String> {
        let mut buffer = Vec::new();
        let mut context = self.new_context();
        self.emit(item, &mut buffer, &mut context)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub struct EmitHelper;

impl EmitHelper {
    pub fn write_line<W: Write>(writer: &mut W, context: &EmitContext, text: &str) -> EmitResult {
        writeln!(writer, "{}{}", context.get_indent(), text)?;
        Ok(())
    }

    pub fn paint(context: &EmitContext, text: &str, color: &str) -> String {
        if !context.use_colors {
            return text.to_string();
        }
        use colored::Colorize;
        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            "magenta" => text.magenta().to_string(),
            "cyan" => text.cyan().to_string(),
            "bright_black" => text.bright_black().to_string(),
            "bold_blue" => text.blue().bold().to_string(),
            _ => text.to_string(),
        }
    }

    pub fn write_colored_line<W: Write>(writer: &mut W, context: &EmitContext, text: &str, color: &str) -> EmitResult {
        Self::write_line(writer, context, &Self::paint(context, text, color))
    }

    /// `;; comment`, one line per line of `comment`.
    pub fn write_comment<W: Write>(writer: &mut W, context: &EmitContext, comment: &str) -> EmitResult {
        for line in comment.lines() {
            Self::write_colored_line(writer, context, &format!(";; {}", line), "green")?;
        }
        Ok(())
    }
}
