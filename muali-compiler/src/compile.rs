//! Lowering from the AST to register bytecode.

use std::rc::Rc;

use tracing::{debug, trace};

use muali_asm::{Encoder, Function, Imm, Opcode, Program, RegisterId};

use crate::ast::Node;
use crate::error::CompileError;
use crate::expr::{ExprInfo, Place, StaticType};
use crate::opt::optimize;
use crate::scope::{RegisterPool, Scopes, VarSlot};

/// Compile a whole `program` AST.
///
/// Runs two passes: the first registers every function and top-level
/// variable name so bodies can refer forward, the second compiles each
/// function body.
pub fn compile_program(root: &Rc<Node>) -> Result<Program, CompileError> {
    let root = optimize(root);
    let mut program = Program::default();

    for item in root.children.iter() {
        let item = unwrap_item(item);
        match item.kind() {
            "funcdef" => {
                let name = item.child(0)?.token()?.to_string();
                if program.func_names.contains_key(&name) {
                    return Err(CompileError::DuplicateFunction(name));
                }
                program.func_names.insert(name, program.funcs.len());
                program.funcs.push(Rc::new(Function::default()));
            }
            "vardec" => {
                let name = item.child(0)?.child(0)?.text.clone();
                let next = program.var_names.len();
                program.var_names.entry(name).or_insert(next);
            }
            _ => {}
        }
    }

    for item in root.children.iter() {
        let item = unwrap_item(item);
        if item.kind() == "funcdef" {
            let name = item.child(0)?.token()?;
            let index = program.func_names[name];
            let func = compile_func(item, &program)?;
            debug!(
                name,
                code = func.code.len(),
                num_vars = func.num_vars,
                num_regs = func.num_regs,
                "compiled function"
            );
            program.funcs[index] = Rc::new(func);
        }
    }

    Ok(program)
}

/// Compile a single `funcdef` against an already-named program.
pub fn compile_func(node: &Rc<Node>, program: &Program) -> Result<Function, CompileError> {
    if node.kind() != "funcdef" {
        return Err(CompileError::MalformedAst(format!(
            "expected a funcdef, found `{}`",
            node.kind()
        )));
    }
    let params = node.child(1)?;
    let body = node.child(2)?;

    // Pre-walk the body to size the variable slots: one per vardec, two per
    // foreach, and one per parameter ahead of them all.
    let mut declared = 0usize;
    count_declarations(body, &mut declared);
    let num_args = params.children.len();
    let num_vars = num_args + declared;
    if num_vars > u16::MAX as usize {
        return Err(CompileError::TooManyRegisters(u16::MAX as usize));
    }

    let mut fc = FuncCompiler {
        program,
        scopes: Scopes::new(num_vars),
        pool: RegisterPool::new(num_vars),
        enc: Encoder::new(),
    };

    for param in params.children.iter() {
        let (name, ty) = declarator_parts(param)?;
        fc.scopes.declare(name, ty)?;
    }

    for stmt in body.children.iter() {
        fc.stmt(stmt)?;
    }

    // Falling off the end must fault deterministically, never run into
    // whatever memory follows the buffer.
    fc.enc.push_u8(0x00);

    Ok(Function {
        code: fc.enc.into_code(),
        num_args,
        num_vars,
        num_regs: fc.pool.num_regs(),
    })
}

/// Top-level items may arrive wrapped in statement nodes.
fn unwrap_item(node: &Rc<Node>) -> &Rc<Node> {
    let mut current = node;
    while matches!(current.kind(), "statement" | "simple_statement")
        && !current.children.is_empty()
    {
        current = &current.children[0];
    }
    current
}

fn count_declarations(node: &Rc<Node>, count: &mut usize) {
    match node.kind() {
        "vardec" => *count += 1,
        // The induction variable plus the reserved bound slot.
        "foreach" => *count += 2,
        _ => {}
    }
    for child in node.children.iter() {
        count_declarations(child, count);
    }
}

fn declarator_parts(node: &Rc<Node>) -> Result<(&str, StaticType), CompileError> {
    let name = node.child(0)?.text.as_str();
    let ty = match node.children.get(1) {
        Some(token) => StaticType::from_token(&token.text),
        None => StaticType::Invalid,
    };
    Ok((name, ty))
}

struct FuncCompiler<'a> {
    program: &'a Program,
    scopes: Scopes,
    pool: RegisterPool,
    enc: Encoder,
}

impl FuncCompiler<'_> {
    fn stmt(&mut self, node: &Rc<Node>) -> Result<(), CompileError> {
        match node.kind() {
            "statement" | "simple_statement" => self.stmt(node.child(0)?),
            "block" | "simple_block" => {
                self.scopes.push();
                for child in node.children.iter() {
                    self.stmt(child)?;
                }
                self.scopes.pop();
                Ok(())
            }
            "vardec" => self.vardec(node),
            "assign" => self.assign(node),
            "assign_binop" => self.assign_binop(node),
            "inplace_negate" => self.inplace_negate(node),
            "foreach" => self.foreach(node),
            "return" => self.ret(node),
            other => Err(CompileError::UnsupportedConstruct(other.to_string())),
        }
    }

    fn vardec(&mut self, node: &Rc<Node>) -> Result<(), CompileError> {
        let (name, mut ty) = declarator_parts(node.child(0)?)?;
        if node.children.len() == 1 {
            self.scopes.declare(name, ty)?;
            return Ok(());
        }
        let init = self.expr(node.child(node.children.len() - 1)?)?;
        // An unannotated declaration takes its static type from the
        // initializer.
        if ty == StaticType::Invalid {
            ty = init.ty;
        }
        let index = self.scopes.declare(name, ty)?;
        self.store_into(index, &init)
    }

    fn assign(&mut self, node: &Rc<Node>) -> Result<(), CompileError> {
        let rhs = self.expr(node.child(1)?)?;
        let name = node.child(0)?.token()?;
        let slot = self.lookup_var(name)?;
        self.store_into(slot.index, &rhs)
    }

    fn assign_binop(&mut self, node: &Rc<Node>) -> Result<(), CompileError> {
        let rhs = self.expr(node.child(2)?)?;
        let name = node.child(0)?.token()?;
        let op_token = node.child(1)?.token()?;
        let slot = self.lookup_var(name)?;

        let operator = match op_token {
            "+=" => "+",
            "-=" => "-",
            "*=" => "*",
            "/=" => "/",
            other => {
                return Err(CompileError::UnsupportedConstruct(format!(
                    "compound operator `{other}`"
                )))
            }
        };

        // `x *= -1.0` on a float variable is a sign flip.
        if operator == "*"
            && slot.ty == StaticType::Float
            && matches!(rhs.place, Place::Float(n) if n == -1.0)
        {
            self.emit_r(Opcode::NEGATE_F, slot.index);
            return Ok(());
        }

        let opcode = select_opcode(operator, rhs.is_immediate(), slot.ty, rhs.ty)?;
        self.enc.push_op(opcode);
        self.enc.push_reg(slot.index);
        self.emit_operand(&rhs)
    }

    fn inplace_negate(&mut self, node: &Rc<Node>) -> Result<(), CompileError> {
        let name = node.child(0)?.token()?;
        let slot = self.lookup_var(name)?;
        let opcode = if slot.ty == StaticType::Float {
            Opcode::NEGATE_F
        } else {
            Opcode::NEGATE
        };
        self.emit_r(opcode, slot.index);
        Ok(())
    }

    fn ret(&mut self, node: &Rc<Node>) -> Result<(), CompileError> {
        if node.children.is_empty() {
            self.enc.push_op(Opcode::RETURNIMM);
            self.enc.push_imm(Imm::Null);
            return Ok(());
        }
        let value = self.expr(node.child(0)?)?;
        if let Some(imm) = value.as_imm() {
            self.enc.push_op(Opcode::RETURNIMM);
            self.enc.push_imm(imm);
            return Ok(());
        }
        match value.place {
            Place::Reg(reg) => {
                self.emit_r(Opcode::RETURNVAL, reg);
                self.pool.free(reg);
                Ok(())
            }
            ref other => Err(self.place_error(other)),
        }
    }

    fn foreach(&mut self, node: &Rc<Node>) -> Result<(), CompileError> {
        let has_start = node.children.len() == 4;
        if !(node.children.len() == 3 || has_start) {
            return Err(CompileError::MalformedAst(
                "foreach expects declarator, optional start, end, body".into(),
            ));
        }
        let end_node = node.child(if has_start { 2 } else { 1 })?;
        let body = node.child(node.children.len() - 1)?;

        self.scopes.push();
        let (name, ty) = declarator_parts(node.child(0)?)?;
        let index = self.scopes.declare(name, ty)?;

        let end = self.expr(end_node)?;
        let Place::Int(end) = end.place else {
            return Err(CompileError::ForeachBoundNotConstant);
        };

        // Seed the induction variable one below the first iteration value;
        // the back edge pre-increments before comparing.
        if has_start {
            let start = self.expr(node.child(1)?)?;
            let Place::Int(start) = start.place else {
                return Err(CompileError::ForeachBoundNotConstant);
            };
            self.enc.push_op(Opcode::SETIMM);
            self.enc.push_reg(index);
            self.enc.push_imm(Imm::Int(start.wrapping_sub(1)));
        } else {
            self.emit_r(Opcode::SETZEROI, index);
            self.emit_r(Opcode::DECI, index);
        }

        self.enc.push_op(Opcode::J);
        let offset_pos = self.enc.len();
        self.enc.push_i32(0);

        self.stmt(body)?;

        let forward = branch_offset(self.enc.len() as i64 - (offset_pos as i64 + 4))?;
        self.enc.patch_i32(offset_pos, forward);

        let opcode = if ty == StaticType::Int {
            Opcode::JINCILTIMM_INT
        } else {
            Opcode::JINCILTIMM
        };
        self.enc.push_op(opcode);
        self.enc.push_reg(index);
        self.enc.push_i64(end);
        // Lands immediately after the forward jump's offset field.
        let back = branch_offset(offset_pos as i64 - self.enc.len() as i64)?;
        self.enc.push_i32(back);

        self.scopes.pop();
        Ok(())
    }

    fn expr(&mut self, node: &Rc<Node>) -> Result<ExprInfo, CompileError> {
        match node.kind() {
            "expr" | "simple_expr" => self.expr(node.child(0)?),
            "name" => {
                let name = node.token()?;
                if let Some(slot) = self.scopes.lookup(name) {
                    return Ok(ExprInfo::reg(slot.index, slot.ty));
                }
                if let Some(&global) = self.program.var_names.get(name) {
                    return Ok(ExprInfo {
                        place: Place::Global(global),
                        ty: StaticType::Invalid,
                    });
                }
                if let Some(&func) = self.program.func_names.get(name) {
                    return Ok(ExprInfo {
                        place: Place::Func(func),
                        ty: StaticType::Invalid,
                    });
                }
                Err(CompileError::UnknownName(name.to_string()))
            }
            "int" => {
                let token = node.token()?;
                token.parse().map(ExprInfo::int).map_err(|_| {
                    CompileError::MalformedAst(format!("bad integer literal `{token}`"))
                })
            }
            "float" => {
                let token = node.token()?;
                token.parse().map(ExprInfo::float).map_err(|_| {
                    CompileError::MalformedAst(format!("bad float literal `{token}`"))
                })
            }
            "base_unexp" => {
                if node.children.len() == 1 {
                    self.expr(node.child(0)?)
                } else {
                    self.unexp(node)
                }
            }
            kind if kind == "base_binexp" || kind.starts_with("binexp_") => {
                if node.children.len() == 1 {
                    self.expr(node.child(0)?)
                } else {
                    self.binexp(node)
                }
            }
            other => Err(CompileError::UnsupportedConstruct(other.to_string())),
        }
    }

    fn unexp(&mut self, node: &Rc<Node>) -> Result<ExprInfo, CompileError> {
        let operator = node.child(0)?.token()?;
        let operand = self.expr(node.child(1)?)?;
        match operator {
            "+" => Ok(operand),
            "-" => match operand.place {
                Place::Int(n) => Ok(ExprInfo::int(n.wrapping_neg())),
                Place::Float(n) => Ok(ExprInfo::float(-n)),
                Place::Reg(reg) => {
                    let opcode = if operand.ty == StaticType::Float {
                        Opcode::NEGATE_F
                    } else {
                        Opcode::NEGATE
                    };
                    self.emit_r(opcode, reg);
                    Ok(operand)
                }
                ref other => Err(self.place_error(other)),
            },
            other => Err(CompileError::UnsupportedConstruct(format!(
                "unary operator `{other}`"
            ))),
        }
    }

    fn binexp(&mut self, node: &Rc<Node>) -> Result<ExprInfo, CompileError> {
        let expr1 = self.expr(node.child(0)?)?;
        let operator = node.child(1)?.token()?;
        let expr2 = self.expr(node.child(2)?)?;

        // Inc/dec recognition: adding or subtracting the integer literal 1
        // works directly on the left operand's register. A proven-float
        // left side keeps the generic opcode; `INCI` requires an integer.
        if let (Place::Reg(reg), Place::Int(1)) = (&expr1.place, &expr2.place) {
            let peephole = match (operator, expr1.ty) {
                ("+", StaticType::Int) => Some(Opcode::INCI_INT),
                ("+", StaticType::Invalid) => Some(Opcode::INCI),
                ("-", StaticType::Int) => Some(Opcode::DECI_INT),
                ("-", StaticType::Invalid) => Some(Opcode::DECI),
                _ => None,
            };
            if let Some(opcode) = peephole {
                self.emit_r(opcode, *reg);
                return Ok(expr1);
            }
        }

        // The left operand's scratch register (variables are exempt) goes
        // back to the pool first so the output can reuse it.
        if let Place::Reg(reg) = expr1.place {
            self.pool.free(reg);
        }
        let out = self.pool.alloc()?;

        match &expr1.place {
            Place::Reg(reg) if *reg == out => {}
            Place::Reg(reg) => {
                let opcode = match expr1.ty {
                    StaticType::Int => Opcode::SET_I,
                    StaticType::Float => Opcode::SET_F,
                    StaticType::Invalid => Opcode::SET,
                };
                self.emit_rr(opcode, out, *reg);
            }
            other => {
                let imm = expr1.as_imm().ok_or_else(|| self.place_error(other))?;
                self.enc.push_op(Opcode::SETIMM);
                self.enc.push_reg(out);
                self.enc.push_imm(imm);
            }
        }

        let opcode = select_opcode(operator, expr2.is_immediate(), expr1.ty, expr2.ty)?;
        trace!(%opcode, operator, "selected opcode");
        self.enc.push_op(opcode);
        self.enc.push_reg(out);
        self.emit_operand(&expr2)?;

        Ok(ExprInfo::reg(out, result_type(operator, expr1.ty, expr2.ty)))
    }

    /// Emit the trailing register-or-immediate operand, returning a used
    /// scratch register to the pool afterwards.
    fn emit_operand(&mut self, expr: &ExprInfo) -> Result<(), CompileError> {
        if let Some(imm) = expr.as_imm() {
            self.enc.push_imm(imm);
            return Ok(());
        }
        match expr.place {
            Place::Reg(reg) => {
                self.enc.push_reg(reg);
                self.pool.free(reg);
                Ok(())
            }
            ref other => Err(self.place_error(other)),
        }
    }

    /// `SET`/`SETIMM` an expression result into a variable slot. A copy of
    /// a register onto itself is elided.
    fn store_into(&mut self, index: RegisterId, expr: &ExprInfo) -> Result<(), CompileError> {
        if let Some(imm) = expr.as_imm() {
            self.enc.push_op(Opcode::SETIMM);
            self.enc.push_reg(index);
            self.enc.push_imm(imm);
            return Ok(());
        }
        match expr.place {
            Place::Reg(src) => {
                if src != index {
                    self.emit_rr(Opcode::SET, index, src);
                }
                Ok(())
            }
            ref other => Err(self.place_error(other)),
        }
    }

    fn lookup_var(&self, name: &str) -> Result<VarSlot, CompileError> {
        if let Some(slot) = self.scopes.lookup(name) {
            return Ok(slot);
        }
        if self.program.var_names.contains_key(name) {
            return Err(CompileError::ReservedGlobal(name.to_string()));
        }
        Err(CompileError::UnknownName(name.to_string()))
    }

    fn place_error(&self, place: &Place) -> CompileError {
        match place {
            Place::Global(index) => {
                let name = self
                    .program
                    .var_names
                    .iter()
                    .find(|(_, i)| *i == index)
                    .map(|(name, _)| name.clone())
                    .unwrap_or_default();
                CompileError::ReservedGlobal(name)
            }
            Place::Str(_) => {
                CompileError::UnsupportedConstruct("string immediate".into())
            }
            Place::Func(_) => {
                CompileError::UnsupportedConstruct("function reference in value position".into())
            }
            _ => CompileError::MalformedAst("expression has no usable place".into()),
        }
    }

    fn emit_r(&mut self, opcode: Opcode, a: RegisterId) {
        self.enc.push_op(opcode);
        self.enc.push_reg(a);
    }

    fn emit_rr(&mut self, opcode: Opcode, a: RegisterId, b: RegisterId) {
        self.enc.push_op(opcode);
        self.enc.push_reg(a);
        self.enc.push_reg(b);
    }
}

fn branch_offset(diff: i64) -> Result<i32, CompileError> {
    i32::try_from(diff)
        .map_err(|_| CompileError::MalformedAst("branch offset overflows 32 bits".into()))
}

fn select_opcode(
    operator: &str,
    imm: bool,
    lhs: StaticType,
    rhs: StaticType,
) -> Result<Opcode, CompileError> {
    use StaticType::{Float, Int};

    let opcode = match (operator, imm) {
        ("+", true) => Opcode::ADDIMM,
        ("+", false) => match (lhs, rhs) {
            (Float, Float) => Opcode::ADD_FF,
            (Float, _) => Opcode::ADD_F,
            _ => Opcode::ADD,
        },
        ("-", true) => Opcode::SUBIMM,
        ("-", false) => Opcode::SUB,
        ("*", true) => Opcode::MULIMM,
        ("*", false) => Opcode::MUL,
        ("/", true) => Opcode::DIVIMM,
        ("/", false) => match (lhs, rhs) {
            (Float, Float) => Opcode::DIV_FF,
            (Float, Int) => Opcode::DIV_FI,
            (Float, _) => Opcode::DIV_F,
            _ => Opcode::DIV,
        },
        ("%", true) => Opcode::MODIMM,
        ("%", false) => Opcode::MOD,
        ("<<", true) if lhs == Int => Opcode::SHLIMM_I,
        ("<<", true) => Opcode::SHLIMM,
        ("<<", false) => Opcode::SHL,
        (">>", true) => Opcode::SHRIMM,
        (">>", false) => Opcode::SHR,
        ("&", true) => Opcode::BITANDIMM,
        ("&", false) => Opcode::BITAND,
        ("|", true) => Opcode::BITORIMM,
        ("|", false) => Opcode::BITOR,
        ("^", true) => Opcode::BITXORIMM,
        ("^", false) => Opcode::BITXOR,
        _ => {
            return Err(CompileError::UnsupportedConstruct(format!(
                "binary operator `{operator}`"
            )))
        }
    };
    Ok(opcode)
}

/// Static type of a binary result, when both inputs are proven.
fn result_type(operator: &str, lhs: StaticType, rhs: StaticType) -> StaticType {
    use StaticType::{Float, Int, Invalid};

    if lhs == Invalid || rhs == Invalid {
        return Invalid;
    }
    match operator {
        "+" | "-" | "*" | "/" | "%" => {
            if lhs == Float || rhs == Float {
                Float
            } else {
                Int
            }
        }
        "<<" | ">>" | "&" | "|" | "^" => {
            if lhs == Int && rhs == Int {
                Int
            } else {
                Invalid
            }
        }
        _ => Invalid,
    }
}
