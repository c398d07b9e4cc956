use std::io::{self, Write};

use derive_more::Display;

use crate::sym_table::VarKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Segment {
    #[display(fmt = "constant")]
    Const,
    #[display(fmt = "argument")]
    Arg,
    #[display(fmt = "local")]
    Local,
    #[display(fmt = "static")]
    Static,
    #[display(fmt = "this")]
    This,
    #[display(fmt = "that")]
    That,
    #[display(fmt = "pointer")]
    Pointer,
    #[display(fmt = "temp")]
    Temp,
}

impl From<VarKind> for Segment {
    fn from(kind: VarKind) -> Self {
        match kind {
            VarKind::Static => Segment::Static,
            VarKind::Field => Segment::This,
            VarKind::Arg => Segment::Arg,
            VarKind::Var => Segment::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Command {
    #[display(fmt = "add")]
    Add,
    #[display(fmt = "sub")]
    Sub,
    #[display(fmt = "neg")]
    Neg,
    #[display(fmt = "eq")]
    Eq,
    #[display(fmt = "gt")]
    Gt,
    #[display(fmt = "lt")]
    Lt,
    #[display(fmt = "and")]
    And,
    #[display(fmt = "or")]
    Or,
    #[display(fmt = "not")]
    Not,
}

/// One line of VM code.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Instruction {
    #[display(fmt = "push {} {}", _0, _1)]
    Push(Segment, u16),
    #[display(fmt = "pop {} {}", _0, _1)]
    Pop(Segment, u16),
    #[display(fmt = "{}", _0)]
    Arithmetic(Command),
    #[display(fmt = "label {}", _0)]
    Label(String),
    #[display(fmt = "goto {}", _0)]
    Goto(String),
    #[display(fmt = "if-goto {}", _0)]
    IfGoto(String),
    #[display(fmt = "call {} {}", _0, _1)]
    Call(String, u16),
    #[display(fmt = "function {} {}", _0, _1)]
    Function(String, u16),
    #[display(fmt = "return")]
    Return,
    #[display(fmt = "// {}", _0)]
    Comment(String),
}

impl Instruction {
    pub fn is_comment(&self) -> bool {
        matches!(self, Instruction::Comment(_))
    }
}

/// Line oriented sink for VM code.
pub struct VmWriter<W: Write> {
    out: W,
}

impl<W: Write> VmWriter<W> {
    pub fn new(out: W) -> Self {
        VmWriter { out }
    }

    fn write(&mut self, data: &str) -> io::Result<()> {
        self.out.write_all(data.as_bytes())
    }

    pub fn write_instruction(&mut self, ins: &Instruction) -> io::Result<()> {
        match ins {
            Instruction::Push(seg, idx) => self.write_push(*seg, *idx),
            Instruction::Pop(seg, idx) => self.write_pop(*seg, *idx),
            Instruction::Arithmetic(cmd) => self.write_arithmetic(*cmd),
            Instruction::Label(l) => self.write_label(l),
            Instruction::Goto(l) => self.write_goto(l),
            Instruction::IfGoto(l) => self.write_if(l),
            Instruction::Call(name, n_args) => self.write_call(name, *n_args),
            Instruction::Function(name, n_locals) => self.write_function(name, *n_locals),
            Instruction::Return => self.write_return(),
            Instruction::Comment(_) => self.write(&format!("{ins}\n")),
        }
    }

    pub fn write_all(&mut self, code: &[Instruction]) -> io::Result<()> {
        for ins in code {
            self.write_instruction(ins)?;
        }
        self.out.flush()
    }

    pub fn write_push(&mut self, seg: Segment, idx: u16) -> io::Result<()> {
        self.write(&format!("push {seg} {idx}\n"))
    }

    pub fn write_pop(&mut self, seg: Segment, idx: u16) -> io::Result<()> {
        self.write(&format!("pop {seg} {idx}\n"))
    }

    pub fn write_arithmetic(&mut self, cmd: Command) -> io::Result<()> {
        self.write(&format!("{cmd}\n"))
    }

    pub fn write_label(&mut self, label: &str) -> io::Result<()> {
        self.write(&format!("label {label}\n"))
    }

    pub fn write_goto(&mut self, label: &str) -> io::Result<()> {
        self.write(&format!("goto {label}\n"))
    }

    pub fn write_if(&mut self, label: &str) -> io::Result<()> {
        self.write(&format!("if-goto {label}\n"))
    }

    pub fn write_call(&mut self, name: &str, n_args: u16) -> io::Result<()> {
        self.write(&format!("call {name} {n_args}\n"))
    }

    pub fn write_function(&mut self, name: &str, n_locals: u16) -> io::Result<()> {
        self.write(&format!("function {name} {n_locals}\n"))
    }

    pub fn write_return(&mut self) -> io::Result<()> {
        self.write("return\n")
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_render_as_vm_text() {
        let code = vec![
            Instruction::Function("Main.main".to_string(), 2),
            Instruction::Push(Segment::Const, 7),
            Instruction::Pop(Segment::This, 1),
            Instruction::Arithmetic(Command::Not),
            Instruction::IfGoto("Main.IF_FALSE$3".to_string()),
            Instruction::Call("Math.multiply".to_string(), 2),
            Instruction::Comment("let".to_string()),
            Instruction::Return,
        ];
        let mut w = VmWriter::new(Vec::new());
        w.write_all(&code).unwrap();
        let text = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(
            text,
            "function Main.main 2\npush constant 7\npop this 1\nnot\n\
             if-goto Main.IF_FALSE$3\ncall Math.multiply 2\n// let\nreturn\n"
        );
    }

    #[test]
    fn direct_writes_match_instruction_text() {
        let mut w = VmWriter::new(Vec::new());
        w.write_push(Segment::Local, 0).unwrap();
        w.write_pop(Segment::Pointer, 1).unwrap();
        w.write_arithmetic(Command::Add).unwrap();
        w.write_label("L").unwrap();
        w.write_goto("L").unwrap();
        w.write_if("L").unwrap();
        w.write_call("String.new", 1).unwrap();
        w.write_function("Foo.bar", 0).unwrap();
        w.write_return().unwrap();
        let text = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(
            text,
            "push local 0\npop pointer 1\nadd\nlabel L\ngoto L\nif-goto L\n\
             call String.new 1\nfunction Foo.bar 0\nreturn\n"
        );
    }

    #[test]
    fn fields_live_in_this() {
        assert_eq!(Segment::from(VarKind::Field), Segment::This);
        assert_eq!(Segment::from(VarKind::Var).to_string(), "local");
    }
}
