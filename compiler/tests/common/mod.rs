#![allow(dead_code)]
//! Minimal stack VM used to run generated code in tests.

use std::collections::HashMap;

use jackc::{Compiler, CompilerConfig};

#[derive(Debug, Clone)]
enum Op {
    Push(String, usize),
    Pop(String, usize),
    Arithmetic(String),
    Label,
    Goto(String),
    IfGoto(String),
    Function(usize),
    Call(String, usize),
    Return,
}

struct Frame {
    return_pc: usize,
    stack_base: usize,
    argument: Vec<i32>,
    local: Vec<i32>,
    this: i32,
    that: i32,
}

const HALT: usize = usize::MAX;
const MAX_STEPS: usize = 100_000;

pub struct VmEmulator {
    program: Vec<Op>,
    labels: HashMap<String, usize>,
    functions: HashMap<String, usize>,
    pub stack: Vec<i32>,
    pub heap: Vec<i32>,
    pub statics: HashMap<usize, i32>,
    temp: [i32; 8],
    argument: Vec<i32>,
    local: Vec<i32>,
    this: i32,
    that: i32,
    frames: Vec<Frame>,
    pc: usize,
}

impl VmEmulator {
    pub fn load(text: &str) -> Self {
        let mut program = Vec::new();
        let mut labels = HashMap::new();
        let mut functions = HashMap::new();
        for line in text.lines() {
            let line = line.split("//").next().unwrap().trim();
            if line.is_empty() {
                continue;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            let num = |i: usize| -> usize { words[i].parse().unwrap() };
            let op = match words[0] {
                "push" => Op::Push(words[1].to_string(), num(2)),
                "pop" => Op::Pop(words[1].to_string(), num(2)),
                "label" => {
                    assert!(
                        labels.insert(words[1].to_string(), program.len()).is_none(),
                        "duplicate label {}",
                        words[1]
                    );
                    Op::Label
                }
                "goto" => Op::Goto(words[1].to_string()),
                "if-goto" => Op::IfGoto(words[1].to_string()),
                "function" => {
                    functions.insert(words[1].to_string(), program.len());
                    Op::Function(num(2))
                }
                "call" => Op::Call(words[1].to_string(), num(2)),
                "return" => Op::Return,
                cmd => Op::Arithmetic(cmd.to_string()),
            };
            program.push(op);
        }
        VmEmulator {
            program,
            labels,
            functions,
            stack: Vec::new(),
            heap: Vec::new(),
            statics: HashMap::new(),
            temp: [0; 8],
            argument: Vec::new(),
            local: Vec::new(),
            this: 0,
            that: 0,
            frames: Vec::new(),
            pc: HALT,
        }
    }

    /// Calls `function` with `args` and runs until it returns.
    pub fn call(&mut self, function: &str, args: &[i32]) -> i32 {
        self.stack.extend_from_slice(args);
        self.pc = HALT;
        self.invoke(function, args.len());
        let mut steps = 0;
        while self.pc != HALT {
            self.step();
            steps += 1;
            assert!(steps < MAX_STEPS, "program does not terminate");
        }
        self.stack.pop().expect("function returned no value")
    }

    fn pop(&mut self) -> i32 {
        self.stack.pop().expect("stack underflow")
    }

    fn addr(base: i32, idx: usize) -> usize {
        base as usize + idx
    }

    fn alloc(&mut self, n: usize) -> i32 {
        assert!(n > 0, "zero sized allocation");
        let address = self.heap.len();
        self.heap.extend(std::iter::repeat(0).take(n));
        address as i32
    }

    fn invoke(&mut self, function: &str, n_args: usize) {
        if self.builtin(function) {
            if self.pc != HALT {
                self.pc += 1;
            }
            return;
        }
        let target = *self
            .functions
            .get(function)
            .unwrap_or_else(|| panic!("unknown function {function}"));
        let stack_base = self.stack.len() - n_args;
        let argument = self.stack.split_off(stack_base);
        let return_pc = if self.pc == HALT { HALT } else { self.pc + 1 };
        self.frames.push(Frame {
            return_pc,
            stack_base,
            argument: std::mem::replace(&mut self.argument, argument),
            local: std::mem::take(&mut self.local),
            this: self.this,
            that: self.that,
        });
        self.pc = target;
    }

    fn builtin(&mut self, function: &str) -> bool {
        match function {
            "Memory.alloc" | "Array.new" => {
                let n = self.pop() as usize;
                let a = self.alloc(n);
                self.stack.push(a);
            }
            "String.new" => {
                let capacity = self.pop() as usize;
                let a = self.alloc(capacity + 2);
                self.heap[a as usize] = capacity as i32;
                self.stack.push(a);
            }
            "String.appendChar" => {
                let c = self.pop();
                let s = self.pop();
                let len = self.heap[s as usize + 1];
                assert!(len < self.heap[s as usize], "string overflow");
                self.heap[Self::addr(s, 2 + len as usize)] = c;
                self.heap[s as usize + 1] = len + 1;
                self.stack.push(s);
            }
            "String.charAt" => {
                let i = self.pop();
                let s = self.pop();
                assert!(i < self.heap[s as usize + 1], "index out of range");
                let c = self.heap[Self::addr(s, 2 + i as usize)];
                self.stack.push(c);
            }
            "String.length" => {
                let s = self.pop();
                let len = self.heap[s as usize + 1];
                self.stack.push(len);
            }
            "Math.multiply" => {
                let b = self.pop();
                let a = self.pop();
                self.stack.push(a * b);
            }
            "Math.divide" => {
                let b = self.pop();
                let a = self.pop();
                self.stack.push(a / b);
            }
            _ => return false,
        }
        true
    }

    fn step(&mut self) {
        let op = self.program[self.pc].clone();
        let mut next = self.pc + 1;
        match op {
            Op::Push(seg, i) => {
                let v = match seg.as_str() {
                    "constant" => i as i32,
                    "argument" => self.argument[i],
                    "local" => self.local[i],
                    "static" => *self.statics.get(&i).unwrap_or(&0),
                    "this" => self.heap[Self::addr(self.this, i)],
                    "that" => self.heap[Self::addr(self.that, i)],
                    "pointer" => [self.this, self.that][i],
                    "temp" => self.temp[i],
                    other => panic!("unknown segment {other}"),
                };
                self.stack.push(v);
            }
            Op::Pop(seg, i) => {
                let v = self.pop();
                match seg.as_str() {
                    "argument" => self.argument[i] = v,
                    "local" => self.local[i] = v,
                    "static" => {
                        self.statics.insert(i, v);
                    }
                    "this" => {
                        let a = Self::addr(self.this, i);
                        self.heap[a] = v;
                    }
                    "that" => {
                        let a = Self::addr(self.that, i);
                        self.heap[a] = v;
                    }
                    "pointer" if i == 0 => self.this = v,
                    "pointer" => self.that = v,
                    "temp" => self.temp[i] = v,
                    other => panic!("cannot pop into {other}"),
                }
            }
            Op::Arithmetic(cmd) => {
                let v = match cmd.as_str() {
                    "neg" => -self.pop(),
                    "not" => !self.pop(),
                    binary => {
                        let b = self.pop();
                        let a = self.pop();
                        match binary {
                            "add" => a + b,
                            "sub" => a - b,
                            "and" => a & b,
                            "or" => a | b,
                            "eq" => -((a == b) as i32),
                            "gt" => -((a > b) as i32),
                            "lt" => -((a < b) as i32),
                            other => panic!("unknown command {other}"),
                        }
                    }
                };
                self.stack.push(v);
            }
            Op::Label => {}
            Op::Goto(l) => next = self.labels[&l],
            Op::IfGoto(l) => {
                if self.pop() != 0 {
                    next = self.labels[&l];
                }
            }
            Op::Function(n_locals) => self.local = vec![0; n_locals],
            Op::Call(name, n_args) => {
                self.invoke(&name, n_args);
                return;
            }
            Op::Return => {
                let value = self.pop();
                let frame = self.frames.pop().expect("return outside of a call");
                self.stack.truncate(frame.stack_base);
                self.stack.push(value);
                self.argument = frame.argument;
                self.local = frame.local;
                self.this = frame.this;
                self.that = frame.that;
                next = frame.return_pc;
            }
        }
        self.pc = next;
    }
}

pub fn compile(source: &str) -> String {
    let mut out = Vec::new();
    Compiler::new(CompilerConfig::default())
        .compile_to(source, &mut out)
        .unwrap();
    String::from_utf8(out).unwrap()
}

pub fn compile_with_comments(source: &str) -> String {
    let mut out = Vec::new();
    Compiler::new(CompilerConfig {
        emit_comments: true,
    })
    .compile_to(source, &mut out)
    .unwrap();
    String::from_utf8(out).unwrap()
}

pub fn run(source: &str, function: &str, args: &[i32]) -> (i32, VmEmulator) {
    let mut vm = VmEmulator::load(&compile(source));
    let r = vm.call(function, args);
    (r, vm)
}
