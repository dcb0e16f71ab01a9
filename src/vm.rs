// File: src/vm.rs
//
// The stack-based virtual machine: dispatch loop, calling convention,
// upvalue lifecycle, and property/method semantics. A flat `CallFrame`
// stack executes `chunk::OpCode` directly; errors propagate as `Result`
// rather than unwinding through panics.

use crate::chunk::OpCode;
use crate::compiler;
use crate::gc::{Gc, Heap};
use crate::object::{
    NativeFn, ObjBoundMethod, ObjClass, ObjClosure, ObjInstance, ObjKind, ObjNative, UpvalueState,
};
use crate::table::Table;
use crate::value::Value;
use std::io::Write;

/// `STACK_MAX` is `FRAMES_MAX * UINT8_COUNT`: each of up to `FRAMES_MAX`
/// call frames can address at most `UINT8_COUNT` stack slots.
const FRAMES_MAX: usize = 64;
const UINT8_COUNT: usize = 256;
const STACK_MAX: usize = FRAMES_MAX * UINT8_COUNT;

struct CallFrame {
    closure: Gc,
    ip: usize,
    slot_base: usize,
}

#[derive(Debug, PartialEq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// A single runtime error, already formatted with the frame backtrace spec
/// §7 requires ("function name or `script`, line derived from `ip - 1`").
pub struct RuntimeFault {
    pub message: String,
}

/// A `Write` sink backed by a shared buffer, so a caller can hand a `Vm` its
/// own `Box<dyn Write>` via `with_output` while retaining a handle to read
/// back whatever `PRINT` wrote. Integration tests use this instead of
/// shelling out to the built binary to assert on program output.
#[derive(Clone, Default)]
pub struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub struct Vm {
    stack: Vec<Value>,
    stack_top: usize,
    frames: Vec<CallFrame>,
    pub globals: Table,
    open_upvalues: Vec<Gc>,
    pub heap: Heap,
    init_string: Gc,
    start_time: std::time::Instant,
    pub should_exit: bool,
    /// Raw diagnostics from the most recent `interpret` call that ended in
    /// `CompileError` (one entry per panic-mode-recovered error) or
    /// `RuntimeError` (one entry: the fault message plus its `\n`-joined
    /// frame backtrace). The CLI/REPL boundary renders these through
    /// `errors::EngineError` rather than this crate printing them itself.
    pub last_errors: Vec<String>,
    /// Sink for `PRINT`. Defaults to stdout; tests swap in a `Vec<u8>` so
    /// scenario assertions can inspect program output directly rather than
    /// shelling out to the built binary.
    output: Box<dyn std::io::Write>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_output(Box::new(std::io::stdout()))
    }

    pub fn with_output(output: Box<dyn std::io::Write>) -> Self {
        let mut heap = Heap::new();
        let init_string = heap.intern_string("init");
        let mut vm = Self {
            stack: vec![Value::Nil; STACK_MAX],
            stack_top: 0,
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            heap,
            init_string,
            start_time: std::time::Instant::now(),
            should_exit: false,
            last_errors: Vec::new(),
            output,
        };
        crate::natives::define_natives(&mut vm);
        vm
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn define_native(&mut self, name: &'static str, arity: u8, function: NativeFn) {
        let native = self.heap.allocate(ObjKind::Native(ObjNative { name, arity, function }));
        let name_gc = self.heap.intern_string(name);
        self.globals.set(name_gc, Value::Obj(native));
    }

    /// Compiles and runs `source` against this VM's existing globals and
    /// intern table. Sequential calls on the same `Vm` share both.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        self.last_errors.clear();
        let function = match compiler::compile(source, &mut self.heap) {
            Ok(f) => f,
            Err(errors) => {
                self.last_errors = errors;
                return InterpretResult::CompileError;
            }
        };

        self.stack_top = 0;
        self.frames.clear();
        self.open_upvalues.clear();

        self.push(Value::Obj(function));
        let closure = self.heap.allocate(ObjKind::Closure(ObjClosure { function, upvalues: Vec::new() }));
        self.pop();
        self.push(Value::Obj(closure));
        self.frames.push(CallFrame { closure, ip: 0, slot_base: 0 });

        match self.run() {
            Ok(()) => InterpretResult::Ok,
            Err(fault) => {
                self.last_errors = vec![fault.message];
                self.stack_top = 0;
                self.frames.clear();
                self.open_upvalues.clear();
                InterpretResult::RuntimeError
            }
        }
    }

    // ----- stack primitives -----

    fn push(&mut self, value: Value) {
        self.stack[self.stack_top] = value;
        self.stack_top += 1;
    }

    fn pop(&mut self) -> Value {
        self.stack_top -= 1;
        self.stack[self.stack_top]
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack_top - 1 - distance]
    }

    // ----- GC roots -----

    fn collect_garbage(&mut self) -> usize {
        let stack = self.stack.clone();
        let stack_top = self.stack_top;
        let globals = &self.globals;
        let open_upvalues = &self.open_upvalues;
        let init_string = self.init_string;
        let frame_closures: Vec<Gc> = self.frames.iter().map(|f| f.closure).collect();
        self.heap.collect(|heap| {
            for value in &stack[..stack_top] {
                heap.mark_value(*value);
            }
            for closure in &frame_closures {
                heap.mark_object(*closure);
            }
            for up in open_upvalues {
                heap.mark_object(*up);
            }
            heap.mark_table(globals);
            heap.mark_object(init_string);
        })
    }

    fn maybe_collect(&mut self) {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
    }

    /// Runs an unconditional full collection, used by the `gc()` native.
    pub fn run_gc(&mut self) -> usize {
        self.collect_garbage()
    }

    // ----- error formatting -----

    /// "Undefined variable 'x'." plus a "Did you mean 'y'?" hint when some
    /// other global's name is a close edit-distance match.
    fn undefined_global_message(&self, name: Gc) -> String {
        let target = &name.as_string().chars;
        let candidates: Vec<String> =
            self.globals.iter().map(|(k, _)| k.as_string().chars.to_string()).collect();
        Self::append_hint(format!("Undefined variable '{target}'."), target, &candidates)
    }

    /// "Undefined property 'x'." plus a hint drawn from the instance's own
    /// field names and its class's method names.
    fn undefined_property_message(&self, instance: Gc, name: Gc) -> String {
        let target = &name.as_string().chars;
        let mut candidates: Vec<String> =
            instance.as_instance().fields.iter().map(|(k, _)| k.as_string().chars.to_string()).collect();
        candidates.extend(instance.as_instance().class.as_class().methods.iter().map(|(k, _)| k.as_string().chars.to_string()));
        Self::append_hint(format!("Undefined property '{target}'."), target, &candidates)
    }

    /// "Undefined property 'x'." plus a hint drawn from a class's own method
    /// table, used for both direct method dispatch and `super.x`.
    fn undefined_method_message(&self, class: Gc, name: Gc) -> String {
        let target = &name.as_string().chars;
        let candidates: Vec<String> =
            class.as_class().methods.iter().map(|(k, _)| k.as_string().chars.to_string()).collect();
        Self::append_hint(format!("Undefined property '{target}'."), target, &candidates)
    }

    fn append_hint(base: String, target: &str, candidates: &[String]) -> String {
        match crate::errors::find_closest_match(target, candidates) {
            Some(hint) => format!("{base} Did you mean '{hint}'?"),
            None => base,
        }
    }

    fn runtime_error(&mut self, message: impl Into<String>) -> RuntimeFault {
        let mut out = message.into();
        for frame in self.frames.iter().rev() {
            let function = frame.closure.as_closure().function;
            let line = function.as_function().chunk.line_at(frame.ip);
            let name = match function.as_function().name {
                Some(n) => n.as_string().chars.to_string(),
                None => "script".to_string(),
            };
            out.push_str(&format!("\n[line {line}] in {name}"));
        }
        RuntimeFault { message: out }
    }

    // ----- dispatch loop -----

    fn run(&mut self) -> Result<(), RuntimeFault> {
        loop {
            if self.should_exit {
                return Ok(());
            }
            let frame_idx = self.frames.len() - 1;
            let ip = self.frames[frame_idx].ip;
            let closure = self.frames[frame_idx].closure;
            let op = closure.as_closure().function.as_function().chunk.code[ip].clone();
            self.frames[frame_idx].ip += 1;

            match op {
                OpCode::Constant(idx) => {
                    let c = closure.as_closure().function.as_function().chunk.constants[idx as usize];
                    self.push(c);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal(slot) => {
                    let base = self.frames[frame_idx].slot_base;
                    self.push(self.stack[base + slot as usize]);
                }
                OpCode::SetLocal(slot) => {
                    let base = self.frames[frame_idx].slot_base;
                    self.stack[base + slot as usize] = self.peek(0);
                }
                OpCode::GetGlobal(idx) => {
                    let name = self.read_string_constant(closure, idx);
                    match self.globals.get(&name) {
                        Some(v) => self.push(v),
                        None => {
                            let msg = self.undefined_global_message(name);
                            return Err(self.runtime_error(msg));
                        }
                    }
                }
                OpCode::DefineGlobal(idx) => {
                    let name = self.read_string_constant(closure, idx);
                    let value = self.pop();
                    self.globals.set(name, value);
                }
                OpCode::SetGlobal(idx) => {
                    let name = self.read_string_constant(closure, idx);
                    let value = self.peek(0);
                    if !self.globals.set_existing(name, value) {
                        let msg = self.undefined_global_message(name);
                        return Err(self.runtime_error(msg));
                    }
                }
                OpCode::GetUpvalue(idx) => {
                    let up = closure.as_closure().upvalues[idx as usize];
                    let value = self.read_upvalue(up);
                    self.push(value);
                }
                OpCode::SetUpvalue(idx) => {
                    let up = closure.as_closure().upvalues[idx as usize];
                    let value = self.peek(0);
                    self.write_upvalue(up, value);
                }
                OpCode::GetProperty(idx) => {
                    let name = self.read_string_constant(closure, idx);
                    let receiver = self.peek(0);
                    let instance_obj = match receiver {
                        Value::Obj(o) if matches!(o.kind(), ObjKind::Instance(_)) => o,
                        _ => return Err(self.runtime_error("Only instances have properties.")),
                    };
                    if let Some(value) = instance_obj.as_instance().fields.get(&name) {
                        self.pop();
                        self.push(value);
                    } else if let Some(bound) = self.bind_method(instance_obj.as_instance().class, name) {
                        self.pop();
                        self.push(bound);
                    } else {
                        let msg = self.undefined_property_message(instance_obj, name);
                        return Err(self.runtime_error(msg));
                    }
                }
                OpCode::SetProperty(idx) => {
                    let name = self.read_string_constant(closure, idx);
                    let receiver = self.peek(1);
                    let mut instance_obj = match receiver {
                        Value::Obj(o) if matches!(o.kind(), ObjKind::Instance(_)) => o,
                        _ => return Err(self.runtime_error("Only instances have fields.")),
                    };
                    let value = self.pop();
                    instance_obj.as_instance_mut().fields.set(name, value);
                    self.pop();
                    self.push(value);
                }
                OpCode::GetSuper(idx) => {
                    let name = self.read_string_constant(closure, idx);
                    let superclass = self.pop();
                    let superclass_obj = match superclass {
                        Value::Obj(o) => o,
                        _ => unreachable!("super is always a class object"),
                    };
                    match self.bind_method(superclass_obj, name) {
                        Some(bound) => {
                            self.pop();
                            self.push(bound);
                        }
                        None => {
                            let msg = self.undefined_method_message(superclass_obj, name);
                            return Err(self.runtime_error(msg));
                        }
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => self.binary_cmp(|a, b| a > b)?,
                OpCode::Less => self.binary_cmp(|a, b| a < b)?,
                OpCode::Add => {
                    let b = self.peek(0);
                    let a = self.peek(1);
                    match (a, b) {
                        (Value::Number(x), Value::Number(y)) => {
                            self.pop();
                            self.pop();
                            self.push(Value::Number(x + y));
                        }
                        _ if a.is_string() && b.is_string() => {
                            let concatenated = format!("{}{}", a.as_string().unwrap(), b.as_string().unwrap());
                            // a/b stay on the stack (peeked, not popped) until
                            // the new string is interned, keeping them reachable
                            // through any GC the allocation triggers.
                            let gc = self.heap.intern_string(&concatenated);
                            self.pop();
                            self.pop();
                            self.push(Value::Obj(gc));
                            self.maybe_collect();
                        }
                        _ => {
                            return Err(self.runtime_error("Operands must be two numbers or two strings."));
                        }
                    }
                }
                OpCode::Subtract => self.binary_num(|a, b| a - b)?,
                OpCode::Multiply => self.binary_num(|a, b| a * b)?,
                OpCode::Divide => self.binary_num(|a, b| a / b)?,
                OpCode::Not => {
                    let v = self.pop();
                    self.push(Value::Bool(v.is_falsey()));
                }
                OpCode::Negate => {
                    let v = self.peek(0);
                    match v {
                        Value::Number(n) => {
                            self.pop();
                            self.push(Value::Number(-n));
                        }
                        _ => return Err(self.runtime_error("Operand must be a number.")),
                    }
                }
                OpCode::Print => {
                    let v = self.pop();
                    let _ = writeln!(self.output, "{v}");
                }
                OpCode::Jump(offset) => {
                    self.frames[frame_idx].ip += offset as usize;
                }
                OpCode::JumpIfFalse(offset) => {
                    if self.peek(0).is_falsey() {
                        self.frames[frame_idx].ip += offset as usize;
                    }
                }
                OpCode::Loop(offset) => {
                    self.frames[frame_idx].ip -= offset as usize;
                }
                OpCode::Call(argc) => {
                    let callee = self.peek(argc as usize);
                    self.call_value(callee, argc)?;
                    self.maybe_collect();
                }
                OpCode::Invoke(name_idx, argc) => {
                    let name = self.read_string_constant(closure, name_idx);
                    self.invoke(name, argc)?;
                    self.maybe_collect();
                }
                OpCode::SuperInvoke(name_idx, argc) => {
                    let name = self.read_string_constant(closure, name_idx);
                    let superclass = self.pop();
                    let superclass_obj = match superclass {
                        Value::Obj(o) => o,
                        _ => unreachable!("super is always a class object"),
                    };
                    self.invoke_from_class(superclass_obj, name, argc)?;
                    self.maybe_collect();
                }
                OpCode::Closure(fn_idx, upvalue_refs) => {
                    let function = closure.as_closure().function.as_function().chunk.constants[fn_idx as usize];
                    let function_gc = match function {
                        Value::Obj(o) => o,
                        _ => unreachable!("CLOSURE operand is always a function constant"),
                    };
                    let base = self.frames[frame_idx].slot_base;
                    let mut upvalues = Vec::with_capacity(upvalue_refs.len());
                    for (is_local, index) in upvalue_refs {
                        if is_local {
                            let location = base + index as usize;
                            upvalues.push(self.capture_upvalue(location));
                        } else {
                            upvalues.push(closure.as_closure().upvalues[index as usize]);
                        }
                    }
                    let new_closure = self.heap.allocate(ObjKind::Closure(ObjClosure { function: function_gc, upvalues }));
                    self.push(Value::Obj(new_closure));
                    self.maybe_collect();
                }
                OpCode::CloseUpvalue => {
                    let boundary = self.stack_top - 1;
                    self.close_upvalues(boundary);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let base = self.frames[frame_idx].slot_base;
                    self.close_upvalues(base);
                    self.frames.pop();
                    if self.frames.is_empty() {
                        self.pop();
                        return Ok(());
                    }
                    self.stack_top = base;
                    self.push(result);
                }
                OpCode::Class(name_idx) => {
                    let name = self.read_string_constant(closure, name_idx);
                    let class = self.heap.allocate(ObjKind::Class(ObjClass::new(name)));
                    self.push(Value::Obj(class));
                }
                OpCode::Inherit => {
                    let superclass = self.peek(1);
                    let subclass = self.peek(0);
                    let super_obj = match superclass {
                        Value::Obj(o) if matches!(o.kind(), ObjKind::Class(_)) => o,
                        _ => return Err(self.runtime_error("Superclass must be a class.")),
                    };
                    let mut sub_obj = match subclass {
                        Value::Obj(o) => o,
                        _ => unreachable!(),
                    };
                    let methods: Vec<(Gc, Value)> = super_obj.as_class().methods.iter().collect();
                    for (key, value) in methods {
                        sub_obj.as_class_mut().methods.set(key, value);
                    }
                    self.pop();
                }
                OpCode::Method(name_idx) => {
                    let name = self.read_string_constant(closure, name_idx);
                    let method = self.pop();
                    let mut class = match self.peek(0) {
                        Value::Obj(o) => o,
                        _ => unreachable!(),
                    };
                    class.as_class_mut().methods.set(name, method);
                }
            }
        }
    }

    fn read_string_constant(&self, closure: Gc, idx: u8) -> Gc {
        let c = closure.as_closure().function.as_function().chunk.constants[idx as usize];
        match c {
            Value::Obj(o) => o,
            _ => unreachable!("name constant is always a string"),
        }
    }

    fn binary_num(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeFault> {
        let b = self.peek(0);
        let a = self.peek(1);
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(f(x, y)));
                Ok(())
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    fn binary_cmp(&mut self, f: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeFault> {
        let b = self.peek(0);
        let a = self.peek(1);
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Bool(f(x, y)));
                Ok(())
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    // ----- calling convention -----

    fn call_value(&mut self, callee: Value, argc: u8) -> Result<(), RuntimeFault> {
        if let Value::Obj(obj) = callee {
            match obj.kind() {
                ObjKind::Closure(_) => return self.call_closure(obj, argc),
                ObjKind::Class(_) => return self.call_class(obj, argc),
                ObjKind::BoundMethod(_) => return self.call_bound_method(obj, argc),
                ObjKind::Native(_) => return self.call_native(obj, argc),
                _ => {}
            }
        }
        Err(self.runtime_error("Can only call functions and classes."))
    }

    fn call_closure(&mut self, closure: Gc, argc: u8) -> Result<(), RuntimeFault> {
        let arity = closure.as_closure().function.as_function().arity;
        if argc != arity {
            return Err(self.runtime_error(format!("Expected {arity} arguments but got {argc}.")));
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        let slot_base = self.stack_top - argc as usize - 1;
        self.frames.push(CallFrame { closure, ip: 0, slot_base });
        Ok(())
    }

    fn call_class(&mut self, class: Gc, argc: u8) -> Result<(), RuntimeFault> {
        let instance = self.heap.allocate(ObjKind::Instance(ObjInstance::new(class)));
        let callee_slot = self.stack_top - argc as usize - 1;
        self.stack[callee_slot] = Value::Obj(instance);
        if let Some(Value::Obj(initializer)) = class.as_class().methods.get(&self.init_string) {
            return self.call_closure(initializer, argc);
        } else if argc != 0 {
            return Err(self.runtime_error(format!("Expected 0 arguments but got {argc}.")));
        }
        Ok(())
    }

    fn call_bound_method(&mut self, bound: Gc, argc: u8) -> Result<(), RuntimeFault> {
        let receiver = bound.as_bound_method().receiver;
        let method = bound.as_bound_method().method;
        let callee_slot = self.stack_top - argc as usize - 1;
        self.stack[callee_slot] = receiver;
        self.call_closure(method, argc)
    }

    fn call_native(&mut self, native: Gc, argc: u8) -> Result<(), RuntimeFault> {
        let function = native.as_native().function;
        let args_start = self.stack_top - argc as usize;
        let args: Vec<Value> = self.stack[args_start..self.stack_top].to_vec();
        match function(self, &args) {
            Ok(value) => {
                self.stack_top = args_start - 1;
                self.push(value);
                Ok(())
            }
            Err(message) => Err(self.runtime_error(message)),
        }
    }

    fn bind_method(&mut self, class: Gc, name: Gc) -> Option<Value> {
        let method = class.as_class().methods.get(&name)?;
        let method_gc = match method {
            Value::Obj(o) => o,
            _ => unreachable!("method table values are always closures"),
        };
        let receiver = self.peek(0);
        let bound = self.heap.allocate(ObjKind::BoundMethod(ObjBoundMethod { receiver, method: method_gc }));
        Some(Value::Obj(bound))
    }

    fn invoke(&mut self, name: Gc, argc: u8) -> Result<(), RuntimeFault> {
        let receiver = self.peek(argc as usize);
        let instance_obj = match receiver {
            Value::Obj(o) if matches!(o.kind(), ObjKind::Instance(_)) => o,
            _ => return Err(self.runtime_error("Only instances have methods.")),
        };
        if let Some(field) = instance_obj.as_instance().fields.get(&name) {
            let slot = self.stack_top - argc as usize - 1;
            self.stack[slot] = field;
            return self.call_value(field, argc);
        }
        self.invoke_from_class(instance_obj.as_instance().class, name, argc)
    }

    fn invoke_from_class(&mut self, class: Gc, name: Gc, argc: u8) -> Result<(), RuntimeFault> {
        match class.as_class().methods.get(&name) {
            Some(Value::Obj(method)) => self.call_closure(method, argc),
            _ => {
                let msg = self.undefined_method_message(class, name);
                Err(self.runtime_error(msg))
            }
        }
    }

    // ----- upvalue lifecycle -----

    fn read_upvalue(&self, upvalue: Gc) -> Value {
        match upvalue.as_upvalue().state {
            UpvalueState::Open(loc) => self.stack[loc],
            UpvalueState::Closed => upvalue.as_upvalue().closed,
        }
    }

    fn write_upvalue(&mut self, mut upvalue: Gc, value: Value) {
        match upvalue.as_upvalue().state {
            UpvalueState::Open(loc) => self.stack[loc] = value,
            UpvalueState::Closed => upvalue.as_upvalue_mut().closed = value,
        }
    }

    /// Finds or creates an open upvalue at stack index `location`, keeping
    /// `open_upvalues` strictly descending by location.
    fn capture_upvalue(&mut self, location: usize) -> Gc {
        let mut insert_at = self.open_upvalues.len();
        for (i, up) in self.open_upvalues.iter().enumerate() {
            match up.as_upvalue().state {
                UpvalueState::Open(loc) if loc == location => return *up,
                UpvalueState::Open(loc) if loc < location => {
                    insert_at = i;
                    break;
                }
                _ => {}
            }
        }
        let created = self.heap.allocate(ObjKind::Upvalue(crate::object::ObjUpvalue {
            state: UpvalueState::Open(location),
            closed: Value::Nil,
        }));
        self.open_upvalues.insert(insert_at, created);
        created
    }

    /// Closes every open upvalue whose location is `>= boundary`, hoisting
    /// the live stack value into the upvalue's own `closed` cell. Since
    /// `open_upvalues` is sorted descending by location, these are always a
    /// prefix of the list, so this walks from the front.
    fn close_upvalues(&mut self, boundary: usize) {
        while let Some(first) = self.open_upvalues.first() {
            let loc = match first.as_upvalue().state {
                UpvalueState::Open(loc) => loc,
                UpvalueState::Closed => break,
            };
            if loc < boundary {
                break;
            }
            let mut up = self.open_upvalues.remove(0);
            let value = self.stack[loc];
            up.as_upvalue_mut().closed = value;
            up.as_upvalue_mut().state = UpvalueState::Closed;
        }
    }
}
