//! Semantic analysis: symbol tables, id numbering, bit-packing rules,
//! modifier and expression type checks, `bind` resolution.
//!
//! Two passes over the program. Pass 1 installs every top-level symbol in
//! source order and numbers `defid`/`defmid` items, then validates message
//! bodies (bit aggregation state machine, modifier and expression types) —
//! body checks run after symbol installation so a field modifier may name a
//! constant declared later in the file. Pass 2 resolves `bind` directives,
//! which may name messages and ids declared anywhere in the source.

use std::collections::HashMap;

use crate::ast::*;
use crate::signature::{compatible, first_elem, SigElem};
use crate::{CompileError, Result};

/// Analyze `program` in place: assigns id item values and fills message
/// bindings. Any rule violation aborts with a [`CompileError::Semantic`].
pub fn analyze(program: &mut Program) -> Result<()> {
    if program.mspace.is_empty() {
        return err("mspace not declared");
    }

    let Program { decls, types, .. } = program;
    let types: &TypeTable = types;
    let mut an = Analyzer::new(types);
    an.push_scope();

    // Pass 1: top-level symbols in source order.
    let mut binds: Vec<BindDef> = Vec::new();
    for (di, decl) in decls.iter_mut().enumerate() {
        match decl {
            Decl::Const(c) => an.visit_const(c)?,
            Decl::IdGroup(g) => an.visit_id_group(di, g)?,
            Decl::Message(tid) => an.declare_msg(*tid)?,
            Decl::Extern(e) => an.visit_extern(e)?,
            Decl::Bind(b) => binds.push(b.clone()),
            Decl::TypeAlias(_) | Decl::Comment(_) => {}
        }
    }

    // Message bodies, once every top-level name is known.
    for decl in decls.iter() {
        if let Decl::Message(tid) = decl {
            an.visit_msg_body(*tid)?;
        }
    }

    // Pass 2: bind resolution.
    let mut bound_lines: HashMap<String, usize> = HashMap::new();
    for bind in binds {
        let msg_name = match &bind.msg_name {
            Some(name) => name,
            None => continue,
        };
        match an.lookup(msg_name) {
            Some(Symbol::Var { ty, .. }) if types.as_struct(*ty).is_some() => {}
            Some(_) => {
                return err(format!(
                    "bind error at line: {}, '{}' is not a message type",
                    bind.line, msg_name
                ));
            }
            None => {
                return err(format!(
                    "bind error, msg name: {} not found at line: {}",
                    msg_name, bind.line
                ));
            }
        }
        let (di, ii, is_msg_id, _) = match an.mid_map.get(&bind.id_name) {
            Some(entry) => *entry,
            None => {
                return err(format!(
                    "msg bind error at line: {}, msg: {}, mid: {}, mid not defined",
                    bind.line, msg_name, bind.id_name
                ));
            }
        };
        if !is_msg_id {
            return err(format!(
                "msg bind error at line: {}, msg: {}, mid: {}, mid is not a msg id",
                bind.line, msg_name, bind.id_name
            ));
        }
        if let Some(prev_line) = bound_lines.get(&bind.id_name) {
            return err(format!(
                "msg bind error, mid: {} already bound at line: {}, duplicate bind at line: {}",
                bind.id_name, prev_line, bind.line
            ));
        }
        if let Decl::IdGroup(g) = &mut decls[di] {
            g.items[ii].bound_msg = Some(msg_name.clone());
        }
        bound_lines.insert(bind.id_name.clone(), bind.line);
    }

    Ok(())
}

fn err<T>(msg: impl Into<String>) -> Result<T> {
    Err(CompileError::Semantic { msg: msg.into() })
}

#[derive(Clone)]
enum Symbol {
    /// Builtin type name; not usable as a value.
    Builtin,
    Var { ty: TypeId, line: usize },
}

struct SymbolTable {
    table: HashMap<String, Symbol>,
}

impl SymbolTable {
    fn new() -> Self {
        let mut table = HashMap::new();
        for p in BUILTIN_PRIMS {
            table.insert(p.name().to_string(), Symbol::Builtin);
        }
        SymbolTable { table }
    }
}

struct Analyzer<'t> {
    types: &'t TypeTable,
    scopes: Vec<SymbolTable>,
    /// id item name -> (decl index, item index, is_msg_id, line)
    mid_map: HashMap<String, (usize, usize, bool, usize)>,
}

impl<'t> Analyzer<'t> {
    fn new(types: &'t TypeTable) -> Self {
        Analyzer { types, scopes: Vec::new(), mid_map: HashMap::new() }
    }

    fn push_scope(&mut self) {
        self.scopes.push(SymbolTable::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.table.get(name))
    }

    fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes.last().and_then(|s| s.table.get(name))
    }

    fn insert_var(&mut self, name: &str, ty: TypeId, line: usize) -> Result<()> {
        match self.lookup_local(name) {
            Some(Symbol::Var { line: prev, .. }) => err(format!(
                "duplicate symbol: '{}', line: {}, already defined at line: {}",
                name, line, prev
            )),
            Some(Symbol::Builtin) => err(format!(
                "symbol '{}' shadows a builtin type name, line: {}",
                name, line
            )),
            None => {
                if let Some(scope) = self.scopes.last_mut() {
                    scope.table.insert(name.to_string(), Symbol::Var { ty, line });
                }
                Ok(())
            }
        }
    }

    fn visit_const(&mut self, node: &ConstDef) -> Result<()> {
        let ty = self.visit_expr(&node.value)?;
        self.insert_var(&node.name, ty, node.line)
    }

    fn visit_extern(&mut self, node: &ExternDef) -> Result<()> {
        self.insert_var(&node.name, node.ty, node.line)
    }

    fn visit_id_group(&mut self, decl_idx: usize, node: &mut IdGroupDef) -> Result<()> {
        if node.items.is_empty() {
            return Ok(());
        }
        self.insert_var(&node.name, self.types.prim(Prim::Int), node.line)?;

        let mut val: u64 = 0;
        for i in 0..node.items.len() {
            let (name, line) = (node.items[i].name.clone(), node.items[i].line);
            if let Some((_, _, _, orig_line)) = self.mid_map.get(&name) {
                return err(format!(
                    "id already defined, name: {}, orig line: {}, here: {}",
                    name, orig_line, line
                ));
            }
            self.mid_map.insert(name.clone(), (decl_idx, i, node.is_msg_id, line));
            // Item names are program-level integer constants in the output,
            // so they participate in uniqueness and expressions like any
            // other top-level name.
            self.insert_var(&name, self.types.prim(Prim::Int), line)?;

            match node.items[i].explicit_base {
                Some(base) => {
                    if i > 0 && base <= val {
                        let prev = &node.items[i - 1];
                        return err(format!(
                            "id \"{}\" -> {} must be greater than \"{}\" -> {}, line: {}",
                            name, base, prev.name, prev.value, line
                        ));
                    }
                    val = base;
                }
                None => {
                    val += 1;
                }
            }
            node.items[i].value = val;
        }
        Ok(())
    }

    fn declare_msg(&mut self, tid: TypeId) -> Result<()> {
        let s = match self.types.as_struct(tid) {
            Some(s) => s,
            None => return err(format!("message type is not a struct: {}", self.types.describe(tid))),
        };
        self.insert_var(&s.name, tid, s.line)
    }

    fn visit_msg_body(&mut self, tid: TypeId) -> Result<()> {
        let s = match self.types.as_struct(tid) {
            Some(s) => s,
            None => return err(format!("message type is not a struct: {}", self.types.describe(tid))),
        };

        self.push_scope();
        let mut in_aggr = false;
        let mut bits: u32 = 0;
        for f in &s.fields {
            let width = self.types.int_width(f.ty);
            let mut xor_ok = true;
            let sub_byte;
            if in_aggr {
                xor_ok = false;
                sub_byte = true;
                match width {
                    None => {
                        return err(format!(
                            "field in bit aggregation run is not an integer: \"{}\" line: {}",
                            f.name, f.line
                        ));
                    }
                    Some(bn) => {
                        bits += bn;
                        if bits == 8 {
                            bits = 0;
                            in_aggr = false;
                        } else if bits > 8 {
                            return err(format!(
                                "bit field series does not fit the 8-bit boundary ({} bits) at \"{}\" line: {}",
                                bits, f.name, f.line
                            ));
                        }
                    }
                }
            } else if let Some(bn) = width {
                if bn % 8 != 0 {
                    bits = bn;
                    in_aggr = true;
                    sub_byte = true;
                } else {
                    sub_byte = false;
                }
            } else {
                xor_ok = false;
                sub_byte = false;
                bits = 0;
            }

            self.insert_var(&f.name, f.ty, f.line)?;

            if self.types.as_array_elem(f.ty).is_some() && f.limit.is_none() {
                return err(format!(
                    "\"{}\" must be limited by one field or const, line: {}",
                    f.name, f.line
                ));
            }

            if let Some(cond) = &f.exist_if {
                if sub_byte {
                    return err(format!(
                        "exist if is not allowed on a bit-run field: \"{}\" line: {}",
                        f.name, f.line
                    ));
                }
                self.require_int(cond, "exist if", &f.name)?;
            }

            for (label, re) in [
                ("equal", &f.equ),
                ("limit", &f.limit),
                ("max", &f.max),
                ("min", &f.min),
            ] {
                if let Some(r) = re {
                    let ty = self.visit_name_ref(r)?;
                    if self.types.signature(ty) != "I" {
                        return err(format!(
                            "'{}' of \"{}\" should be type int, line: {}",
                            label, f.name, r.line
                        ));
                    }
                }
            }

            if let Some(r) = &f.xor {
                if self.types.is_var_int(f.ty) {
                    return err(format!("var int and xor are exclusive, line: {}", f.line));
                }
                if width.is_none() {
                    return err(format!(
                        "xor requires an integer field: \"{}\" line: {}",
                        f.name, f.line
                    ));
                }
                if !xor_ok {
                    return err(format!(
                        "xor is only allowed on the field opening an 8-bit run: \"{}\" line: {}",
                        f.name, f.line
                    ));
                }
                let ty = self.visit_name_ref(r)?;
                if self.types.signature(ty) != "I" {
                    return err(format!(
                        "'xor' of \"{}\" should be type int, line: {}",
                        f.name, r.line
                    ));
                }
            }
        }

        if in_aggr {
            let result = err(format!(
                "unclosed {}-bit aggregation run at end of \"{}\", line: {}",
                bits, s.name, s.line
            ));
            self.pop_scope();
            return result;
        }
        self.pop_scope();
        Ok(())
    }

    fn require_int(&self, expr: &Expr, what: &str, field: &str) -> Result<()> {
        let ty = self.visit_expr(expr)?;
        if self.types.signature(ty) != "I" {
            return err(format!(
                "{} expression of \"{}\" should be integer, line: {}",
                what,
                field,
                expr.line()
            ));
        }
        Ok(())
    }

    fn visit_name_ref(&self, r: &NameRef) -> Result<TypeId> {
        match self.lookup(&r.name) {
            Some(Symbol::Var { ty, .. }) => Ok(*ty),
            Some(Symbol::Builtin) => err(format!(
                "error in var ref, '{}' is a type name, line: {}",
                r.name, r.line
            )),
            None => err(format!("symbol not found: {}, line: {}", r.name, r.line)),
        }
    }

    fn visit_expr(&self, expr: &Expr) -> Result<TypeId> {
        match expr {
            Expr::Int { .. } => Ok(self.types.prim(Prim::Int)),
            Expr::Str { .. } => Ok(self.types.prim(Prim::Str)),
            Expr::Name(r) => self.visit_name_ref(r),
            Expr::Dot { host, name, line } => {
                let host_ty = self.visit_expr(host)?;
                let s = match self.types.as_struct(host_ty) {
                    Some(s) => s,
                    None => {
                        return err(format!(
                            "error in dot ref, host should be a struct, actual: {}, line: {}",
                            self.types.describe(host_ty),
                            line
                        ));
                    }
                };
                match s.fields.iter().find(|f| &f.name == name) {
                    Some(f) => Ok(f.ty),
                    None => err(format!(
                        "struct {} has no field: {}, line: {}",
                        s.name, name, line
                    )),
                }
            }
            Expr::Index { host, index, line } => {
                let idx_ty = self.visit_expr(index)?;
                if self.types.as_prim(idx_ty) != Some(Prim::Int) {
                    return err(format!(
                        "error in indexed ref, index should be int, actual: {}, line: {}",
                        self.types.describe(idx_ty),
                        line
                    ));
                }
                let host_ty = self.visit_expr(host)?;
                match self.types.as_array_elem(host_ty) {
                    Some(elem) => Ok(elem),
                    None => err(format!(
                        "error in indexed ref, host should be an array, actual: {}, line: {}",
                        self.types.describe(host_ty),
                        line
                    )),
                }
            }
            Expr::Unary { expr, .. } => self.visit_expr(expr),
            Expr::Binary { op, lhs, rhs, line } => self.visit_binary(*op, lhs, rhs, *line),
        }
    }

    fn visit_binary(&self, op: BinOp, lhs: &Expr, rhs: &Expr, line: usize) -> Result<TypeId> {
        let lt = self.visit_expr(lhs)?;
        let rt = self.visit_expr(rhs)?;
        let ls = self.types.signature(lt);
        let rs = self.types.signature(rt);
        if !compatible(&ls, &rs) {
            return err(format!(
                "incompatible types in expression, lhs: {}, rhs: {}, line: {}",
                ls, rs, line
            ));
        }

        match first_elem(&ls) {
            Some(SigElem::Int) | Some(SigElem::Any) => {
                if op.is_comparison() {
                    Ok(self.types.prim(Prim::Int))
                } else {
                    Ok(lt)
                }
            }
            Some(SigElem::Str) => {
                if op == BinOp::Add {
                    Ok(lt)
                } else {
                    err(format!(
                        "string type only allows '+', got '{}', line: {}",
                        op.symbol(),
                        line
                    ))
                }
            }
            _ => err(format!(
                "operator '{}' not allowed on type {}, line: {}",
                op.symbol(),
                self.types.describe(lt),
                line
            )),
        }
    }
}
