// File: src/compiler.rs
//
// Single-pass, Pratt-driven recursive-descent compiler. Parses and emits
// bytecode in the same walk — there is no intermediate AST. Error-accumulating
// methods with panic-mode synchronization; one-line docs on public surface
// only.

use crate::chunk::OpCode;
use crate::gc::{Gc, Heap};
use crate::object::{ObjFunction, ObjKind};
use crate::scanner::{parse_number_literal, Scanner, Token, TokenKind};
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

type ParseFn = fn(&mut Compiler, bool);

struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

fn rule(kind: TokenKind) -> ParseRule {
    use Precedence::*;
    use TokenKind::*;
    let (prefix, infix, precedence): (Option<ParseFn>, Option<ParseFn>, Precedence) = match kind {
        LeftParen => (Some(grouping), Some(call), Call),
        Dot => (None, Some(dot), Call),
        Minus => (Some(unary), Some(binary), Term),
        Plus => (None, Some(binary), Term),
        Slash => (None, Some(binary), Factor),
        Star => (None, Some(binary), Factor),
        Question => (None, Some(ternary), Assignment),
        Bang => (Some(unary), None, None),
        BangEqual => (None, Some(binary), Equality),
        EqualEqual => (None, Some(binary), Equality),
        Greater => (None, Some(binary), Comparison),
        GreaterEqual => (None, Some(binary), Comparison),
        Less => (None, Some(binary), Comparison),
        LessEqual => (None, Some(binary), Comparison),
        Identifier => (Some(variable), None, None),
        String => (Some(string_lit), None, None),
        Number => (Some(number), None, None),
        And => (None, Some(and_), Precedence::And),
        False => (Some(literal), None, None),
        Nil => (Some(literal), None, None),
        Or => (None, Some(or_), Precedence::Or),
        Super => (Some(super_), None, None),
        This => (Some(this_), None, None),
        True => (Some(literal), None, None),
        _ => (None, None, None),
    };
    ParseRule { prefix, infix, precedence }
}

struct Local {
    name: String,
    depth: i32,
    is_captured: bool,
}

struct UpvalueRef {
    index: u8,
    is_local: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

struct FuncScope {
    function: Gc,
    function_type: FunctionType,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueRef>,
    scope_depth: i32,
}

struct ClassScope {
    has_superclass: bool,
}

pub struct Compiler<'a> {
    scanner: Scanner,
    previous: Token,
    current: Token,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<String>,
    heap: &'a mut Heap,
    funcs: Vec<FuncScope>,
    class_stack: Vec<ClassScope>,
}

/// Compiles `source` into a top-level `ObjFunction` ("script"), or a list of
/// compile-time error messages. Panic-mode synchronization means more than
/// one independent error can be reported per compile.
pub fn compile(source: &str, heap: &mut Heap) -> Result<Gc, Vec<String>> {
    let dummy = Token { kind: TokenKind::Eof, lexeme: String::new(), line: 0 };
    let script = heap.allocate(ObjKind::Function(ObjFunction::new()));
    let mut compiler = Compiler {
        scanner: Scanner::new(source),
        previous: dummy.clone(),
        current: dummy,
        had_error: false,
        panic_mode: false,
        errors: Vec::new(),
        heap,
        funcs: vec![FuncScope {
            function: script,
            function_type: FunctionType::Script,
            locals: vec![Local { name: String::new(), depth: 0, is_captured: false }],
            upvalues: Vec::new(),
            scope_depth: 0,
        }],
        class_stack: Vec::new(),
    };

    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.emit_return();

    if compiler.had_error {
        Err(compiler.errors)
    } else {
        Ok(compiler.funcs.pop().unwrap().function)
    }
}

impl<'a> Compiler<'a> {
    // ----- token stream plumbing -----

    fn advance(&mut self) {
        self.previous = self.current.clone();
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let msg = self.current.lexeme.clone();
            self.error_at_current(&msg);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current.clone(), message);
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous.clone(), message);
    }

    fn error_at(&mut self, token: Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let location = match token.kind {
            TokenKind::Eof => "at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!("at '{}'", token.lexeme),
        };
        if location.is_empty() {
            self.errors.push(format!("[line {}] Error: {}", token.line, message));
        } else {
            self.errors.push(format!("[line {}] Error {}: {}", token.line, location, message));
        }
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            use TokenKind::*;
            match self.current.kind {
                Class | Fun | Var | For | If | While | Print | Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ----- emission -----

    fn current_scope(&mut self) -> &mut FuncScope {
        self.funcs.last_mut().unwrap()
    }

    fn emit(&mut self, op: OpCode) -> usize {
        let line = self.previous.line;
        self.current_scope().function.as_function_mut().chunk.write(op, line)
    }

    fn emit_return(&mut self) {
        if self.current_scope().function_type == FunctionType::Initializer {
            self.emit(OpCode::GetLocal(0));
        } else {
            self.emit(OpCode::Nil);
        }
        self.emit(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.current_scope().function.as_function_mut().chunk.add_constant(value) {
            Ok(idx) => idx,
            Err(msg) => {
                self.error(&msg);
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit(OpCode::Constant(idx));
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit(op)
    }

    fn patch_jump(&mut self, index: usize) {
        let chunk_len = self.current_scope().function.as_function().chunk.code.len();
        let offset = chunk_len - index - 1;
        if offset > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        let code = &mut self.current_scope().function.as_function_mut().chunk.code;
        match &mut code[index] {
            OpCode::Jump(o) | OpCode::JumpIfFalse(o) => *o = offset as u16,
            _ => panic!("patch_jump target is not a jump instruction"),
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let next_index = self.current_scope().function.as_function().chunk.code.len() + 1;
        let offset = next_index - loop_start;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        self.emit(OpCode::Loop(offset as u16));
    }

    /// Interns `s`. The freshly-created (or reused) string isn't reachable
    /// from any function's constant pool yet, so if this allocation tips the
    /// heap over its threshold, the collection below must mark it as an
    /// extra root itself — otherwise its own weak intern-table entry would
    /// be evicted by the same collection that just created it.
    fn intern(&mut self, s: &str) -> Gc {
        let gc = self.heap.intern_string(s);
        if self.heap.should_collect() {
            self.collect_garbage(Some(gc));
        }
        gc
    }

    fn collect_garbage(&mut self, extra_root: Option<Gc>) {
        let roots: Vec<Gc> = self.funcs.iter().map(|f| f.function).collect();
        self.heap.collect(|h| {
            for r in &roots {
                h.mark_object(*r);
            }
            if let Some(extra) = extra_root {
                h.mark_object(extra);
            }
        });
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let gc = self.intern(name);
        self.make_constant(Value::Obj(gc))
    }

    // ----- scope / locals / upvalues -----

    fn begin_scope(&mut self) {
        self.current_scope().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.current_scope().scope_depth -= 1;
        let depth = self.current_scope().scope_depth;
        while let Some(local) = self.current_scope().locals.last() {
            if local.depth <= depth {
                break;
            }
            let captured = local.is_captured;
            self.current_scope().locals.pop();
            if captured {
                self.emit(OpCode::CloseUpvalue);
            } else {
                self.emit(OpCode::Pop);
            }
        }
    }

    fn declare_variable(&mut self) {
        if self.current_scope().scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme.clone();
        let depth = self.current_scope().scope_depth;
        for local in self.current_scope().locals.iter().rev() {
            if local.depth != -1 && local.depth < depth {
                break;
            }
            if local.name == name {
                self.error("Already a variable with this name in this scope.");
                return;
            }
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: String) {
        if self.current_scope().locals.len() >= 256 {
            self.error("Too many local variables in function.");
            return;
        }
        self.current_scope().locals.push(Local { name, depth: -1, is_captured: false });
    }

    fn mark_initialized(&mut self) {
        if self.current_scope().scope_depth == 0 {
            return;
        }
        let depth = self.current_scope().scope_depth;
        self.current_scope().locals.last_mut().unwrap().depth = depth;
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.current_scope().scope_depth > 0 {
            return 0;
        }
        let name = self.previous.lexeme.clone();
        self.identifier_constant(&name)
    }

    fn define_variable(&mut self, global: u8) {
        if self.current_scope().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit(OpCode::DefineGlobal(global));
    }

    fn resolve_local(&mut self, scope_idx: usize, name: &str) -> Option<u8> {
        let scope = &self.funcs[scope_idx];
        for (i, local) in scope.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    self.error("Can't read local variable in its own initializer.");
                }
                return Some(i as u8);
            }
        }
        None
    }

    fn add_upvalue(&mut self, scope_idx: usize, index: u8, is_local: bool) -> u8 {
        let scope = &mut self.funcs[scope_idx];
        for (i, up) in scope.upvalues.iter().enumerate() {
            if up.index == index && up.is_local == is_local {
                return i as u8;
            }
        }
        if scope.upvalues.len() >= 256 {
            self.error("Too many closure variables in function.");
            return 0;
        }
        scope.upvalues.push(UpvalueRef { index, is_local });
        let count = scope.upvalues.len() as u8;
        scope.function.as_function_mut().upvalue_count = count;
        count - 1
    }

    fn resolve_upvalue(&mut self, scope_idx: usize, name: &str) -> Option<u8> {
        if scope_idx == 0 {
            return None;
        }
        if let Some(local) = self.resolve_local(scope_idx - 1, name) {
            self.funcs[scope_idx - 1].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(scope_idx, local, true));
        }
        if let Some(upvalue) = self.resolve_upvalue(scope_idx - 1, name) {
            return Some(self.add_upvalue(scope_idx, upvalue, false));
        }
        None
    }

    // ----- declarations / statements -----

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous.clone();
        let name_const = self.identifier_constant(&class_name.lexeme);
        self.declare_variable();
        self.emit(OpCode::Class(name_const));
        self.define_variable(name_const);

        self.class_stack.push(ClassScope { has_superclass: false });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            let super_name = self.previous.clone();
            if super_name.lexeme == class_name.lexeme {
                self.error("A class can't inherit from itself.");
            }
            self.variable_from_token(super_name, false);

            self.begin_scope();
            self.add_local("super".to_string());
            self.define_variable(0);

            self.named_variable_token(class_name.clone(), false);
            self.emit(OpCode::Inherit);
            self.class_stack.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable_token(class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit(OpCode::Pop);

        if self.class_stack.last().unwrap().has_superclass {
            self.end_scope();
        }
        self.class_stack.pop();
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let name = self.previous.lexeme.clone();
        let name_const = self.identifier_constant(&name);
        let ftype = if name == "init" { FunctionType::Initializer } else { FunctionType::Method };
        self.function(ftype);
        self.emit(OpCode::Method(name_const));
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, ftype: FunctionType) {
        let name = self.previous.lexeme.clone();
        let name_gc = self.intern(&name);
        let mut func_obj = self.heap.allocate(ObjKind::Function(ObjFunction::new()));
        func_obj.as_function_mut().name = Some(name_gc);

        self.funcs.push(FuncScope {
            function: func_obj,
            function_type: ftype,
            locals: vec![Local {
                name: if ftype == FunctionType::Function { String::new() } else { "this".to_string() },
                depth: 0,
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
        });

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                let arity = self.current_scope().function.as_function().arity;
                if arity == 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                self.current_scope().function.as_function_mut().arity += 1;
                let param = self.parse_variable("Expect parameter name.");
                self.define_variable(param);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        self.emit_return();
        let finished = self.funcs.pop().unwrap();
        let upvalues = finished.upvalues;
        let function_value = Value::Obj(finished.function);
        let const_idx = self.make_constant(function_value);
        let pairs: Vec<(bool, u8)> = upvalues.iter().map(|u| (u.is_local, u.index)).collect();
        self.emit(OpCode::Closure(const_idx, pairs));
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit(OpCode::Pop);
    }

    fn return_statement(&mut self) {
        if self.current_scope().function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.current_scope().function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit(OpCode::Return);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse(0));
        self.emit(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump(0));
        self.patch_jump(then_jump);
        self.emit(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_scope().function.as_function().chunk.code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse(0));
        self.emit(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_scope().function.as_function().chunk.code.len();
        let mut exit_jump: Option<usize> = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse(0)));
            self.emit(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump(0));
            let increment_start = self.current_scope().function.as_function().chunk.code.len();
            self.expression();
            self.emit(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit(OpCode::Pop);
        }

        self.end_scope();
    }

    // ----- expressions -----

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        let prefix_rule = rule(self.previous.kind).prefix;
        match prefix_rule {
            Some(f) => f(self, can_assign),
            None => {
                self.error("Expect expression.");
                return;
            }
        }

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            let infix_rule = rule(self.previous.kind).infix.expect("infix rule must exist");
            infix_rule(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn named_variable_token(&mut self, name: Token, can_assign: bool) {
        let scope_idx = self.funcs.len() - 1;
        let (get_op, set_op) = if let Some(slot) = self.resolve_local(scope_idx, &name.lexeme) {
            (OpCode::GetLocal(slot), OpCode::SetLocal(slot))
        } else if let Some(idx) = self.resolve_upvalue(scope_idx, &name.lexeme) {
            (OpCode::GetUpvalue(idx), OpCode::SetUpvalue(idx))
        } else {
            let const_idx = self.identifier_constant(&name.lexeme);
            (OpCode::GetGlobal(const_idx), OpCode::SetGlobal(const_idx))
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit(set_op);
        } else {
            self.emit(get_op);
        }
    }

    fn variable_from_token(&mut self, name: Token, can_assign: bool) {
        self.named_variable_token(name, can_assign);
    }
}

fn number(c: &mut Compiler, _can_assign: bool) {
    let value = parse_number_literal(&c.previous.lexeme);
    c.emit_constant(Value::Number(value));
}

fn grouping(c: &mut Compiler, _can_assign: bool) {
    c.expression();
    c.consume(TokenKind::RightParen, "Expect ')' after expression.");
}

fn unary(c: &mut Compiler, _can_assign: bool) {
    let op_kind = c.previous.kind;
    c.parse_precedence(Precedence::Unary);
    match op_kind {
        TokenKind::Bang => {
            c.emit(OpCode::Not);
        }
        TokenKind::Minus => {
            c.emit(OpCode::Negate);
        }
        _ => {}
    }
}

fn binary(c: &mut Compiler, _can_assign: bool) {
    let op_kind = c.previous.kind;
    let prec = rule(op_kind).precedence;
    c.parse_precedence(prec.next());
    match op_kind {
        TokenKind::Plus => {
            c.emit(OpCode::Add);
        }
        TokenKind::Minus => {
            c.emit(OpCode::Subtract);
        }
        TokenKind::Star => {
            c.emit(OpCode::Multiply);
        }
        TokenKind::Slash => {
            c.emit(OpCode::Divide);
        }
        TokenKind::BangEqual => {
            c.emit(OpCode::Equal);
            c.emit(OpCode::Not);
        }
        TokenKind::EqualEqual => {
            c.emit(OpCode::Equal);
        }
        TokenKind::Greater => {
            c.emit(OpCode::Greater);
        }
        TokenKind::GreaterEqual => {
            c.emit(OpCode::Less);
            c.emit(OpCode::Not);
        }
        TokenKind::Less => {
            c.emit(OpCode::Less);
        }
        TokenKind::LessEqual => {
            c.emit(OpCode::Greater);
            c.emit(OpCode::Not);
        }
        _ => {}
    }
}

fn ternary(c: &mut Compiler, _can_assign: bool) {
    let then_jump = c.emit_jump(OpCode::JumpIfFalse(0));
    c.emit(OpCode::Pop);
    c.parse_precedence(Precedence::Assignment);

    let else_jump = c.emit_jump(OpCode::Jump(0));
    c.patch_jump(then_jump);
    c.emit(OpCode::Pop);

    c.consume(TokenKind::Colon, "Expect ':' after then-branch of ternary expression.");
    c.parse_precedence(Precedence::Assignment);
    c.patch_jump(else_jump);
}

fn literal(c: &mut Compiler, _can_assign: bool) {
    match c.previous.kind {
        TokenKind::False => {
            c.emit(OpCode::False);
        }
        TokenKind::True => {
            c.emit(OpCode::True);
        }
        TokenKind::Nil => {
            c.emit(OpCode::Nil);
        }
        _ => unreachable!(),
    }
}

fn string_lit(c: &mut Compiler, _can_assign: bool) {
    let raw = c.previous.lexeme.clone();
    let inner = &raw[1..raw.len() - 1];
    let mut s = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => s.push('\n'),
                Some('t') => s.push('\t'),
                Some('\\') => s.push('\\'),
                Some('"') => s.push('"'),
                Some(other) => s.push(other),
                None => {}
            }
        } else {
            s.push(ch);
        }
    }
    let gc = c.intern(&s);
    c.emit_constant(Value::Obj(gc));
}

fn variable(c: &mut Compiler, can_assign: bool) {
    let name = c.previous.clone();
    c.named_variable_token(name, can_assign);
}

fn and_(c: &mut Compiler, _can_assign: bool) {
    let end_jump = c.emit_jump(OpCode::JumpIfFalse(0));
    c.emit(OpCode::Pop);
    c.parse_precedence(Precedence::And);
    c.patch_jump(end_jump);
}

fn or_(c: &mut Compiler, _can_assign: bool) {
    let else_jump = c.emit_jump(OpCode::JumpIfFalse(0));
    let end_jump = c.emit_jump(OpCode::Jump(0));
    c.patch_jump(else_jump);
    c.emit(OpCode::Pop);
    c.parse_precedence(Precedence::Or);
    c.patch_jump(end_jump);
}

fn call(c: &mut Compiler, _can_assign: bool) {
    let arg_count = argument_list(c);
    c.emit(OpCode::Call(arg_count));
}

fn argument_list(c: &mut Compiler) -> u8 {
    let mut count: u32 = 0;
    if !c.check(TokenKind::RightParen) {
        loop {
            c.expression();
            if count == 255 {
                c.error("Can't have more than 255 arguments.");
            }
            count += 1;
            if !c.match_token(TokenKind::Comma) {
                break;
            }
        }
    }
    c.consume(TokenKind::RightParen, "Expect ')' after arguments.");
    count as u8
}

fn dot(c: &mut Compiler, can_assign: bool) {
    c.consume(TokenKind::Identifier, "Expect property name after '.'.");
    let name = c.previous.lexeme.clone();
    let name_const = c.identifier_constant(&name);

    if can_assign && c.match_token(TokenKind::Equal) {
        c.expression();
        c.emit(OpCode::SetProperty(name_const));
    } else if c.match_token(TokenKind::LeftParen) {
        let arg_count = argument_list(c);
        c.emit(OpCode::Invoke(name_const, arg_count));
    } else {
        c.emit(OpCode::GetProperty(name_const));
    }
}

fn this_(c: &mut Compiler, _can_assign: bool) {
    if c.class_stack.is_empty() {
        c.error("Can't use 'this' outside of a class.");
        return;
    }
    let tok = Token { kind: TokenKind::Identifier, lexeme: "this".to_string(), line: c.previous.line };
    c.named_variable_token(tok, false);
}

fn super_(c: &mut Compiler, _can_assign: bool) {
    if c.class_stack.is_empty() {
        c.error("Can't use 'super' outside of a class.");
    } else if !c.class_stack.last().unwrap().has_superclass {
        c.error("Can't use 'super' in a class with no superclass.");
    }

    c.consume(TokenKind::Dot, "Expect '.' after 'super'.");
    c.consume(TokenKind::Identifier, "Expect superclass method name.");
    let method_name = c.previous.lexeme.clone();
    let name_const = c.identifier_constant(&method_name);

    let this_tok = Token { kind: TokenKind::Identifier, lexeme: "this".to_string(), line: c.previous.line };
    let super_tok = Token { kind: TokenKind::Identifier, lexeme: "super".to_string(), line: c.previous.line };

    c.named_variable_token(this_tok, false);
    if c.match_token(TokenKind::LeftParen) {
        let arg_count = argument_list(c);
        c.named_variable_token(super_tok, false);
        c.emit(OpCode::SuperInvoke(name_const, arg_count));
    } else {
        c.named_variable_token(super_tok, false);
        c.emit(OpCode::GetSuper(name_const));
    }
}
