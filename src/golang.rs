//! Go output backend: record types, big-endian encode/decode with bit
//! aggregation, id constant tables and reverse lookups, dispatch-by-id.

use crate::ast::*;
use crate::emit::{emit_error, lower_cond, CodeSink, ConstEnv, ConstValue, EmitOptions, LineWriter};
use crate::Result;

const GENERATOR_VERSION: &str = "version 1.0";

pub(crate) fn emit_program(
    program: &Program,
    opts: &EmitOptions,
    sink: &mut dyn CodeSink,
) -> Result<()> {
    let mut e = GoEmitter { w: LineWriter::new(sink), env: ConstEnv::new() };
    e.run(program, opts)
}

fn go_name_ref(r: &NameRef) -> String {
    if r.this {
        format!("m.{}", r.name)
    } else {
        r.name.clone()
    }
}

fn go_bin_op(op: BinOp) -> &'static str {
    op.symbol()
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Go spelling of a wire type. Only whole-byte integers and named structs
/// reach the generated record and codec.
fn go_type_name(types: &TypeTable, id: TypeId) -> Result<String> {
    if let Some(p) = types.as_prim(id) {
        let name = match p {
            Prim::U1
            | Prim::U2
            | Prim::U3
            | Prim::U4
            | Prim::U5
            | Prim::U6
            | Prim::U7
            | Prim::U8
            | Prim::Char => "uint8",
            Prim::U16 => "uint16",
            Prim::U32 | Prim::V32 => "uint32",
            Prim::U64 | Prim::V64 => "uint64",
            _ => return emit_error(format!("unsupported type: {}", p.name())),
        };
        return Ok(name.to_string());
    }
    if let Some(s) = types.as_struct(id) {
        return Ok(s.name.clone());
    }
    emit_error(format!("unsupported type: {}", types.describe(id)))
}

/// `max` bound of the sibling field named by an array's `limit`, when the
/// limit names a field at all (a constant limit returns `None`).
fn limit_field_max<'s>(s: &'s StructDef, name: &str) -> Option<&'s NameRef> {
    s.fields.iter().find(|f| f.name == name).and_then(|f| f.max.as_ref())
}

struct GoEmitter<'a> {
    w: LineWriter<'a>,
    env: ConstEnv,
}

impl<'a> GoEmitter<'a> {
    fn run(&mut self, program: &Program, opts: &EmitOptions) -> Result<()> {
        self.w.line("/*");
        self.w.line(&format!(
            " * code auto generated from: {}, Do NOT touch by hand!!!",
            opts.source_name
        ));
        self.w.line(&format!(" * generator {}; mode: golang", GENERATOR_VERSION));
        self.w.line("*/");

        // Id item values participate in constant folding.
        for decl in &program.decls {
            if let Decl::IdGroup(g) = decl {
                for item in &g.items {
                    self.env.set(&item.name, ConstValue::Int(item.value as i64));
                }
            }
        }

        let types = &program.types;
        let mut has_binds = false;
        for decl in &program.decls {
            match decl {
                Decl::Comment(c) => self.w.line(&format!("//{}", c.text)),
                Decl::Const(c) => self.const_def(c)?,
                Decl::IdGroup(g) => self.id_group(g),
                Decl::Message(tid) => self.msg_define(types, *tid)?,
                Decl::TypeAlias(a) => self.type_alias(types, a)?,
                Decl::Bind(_) => has_binds = true,
                Decl::Extern(_) => {}
            }
        }

        if has_binds {
            self.bind_dispatch(program, "encode")?;
            self.bind_dispatch(program, "decode")?;
        }
        Ok(())
    }

    fn const_def(&mut self, node: &ConstDef) -> Result<()> {
        let val = self.env.fold(&node.value)?;
        match &val {
            ConstValue::Int(n) => {
                let comment = self.int_const_comment(*n, &node.value)?;
                self.w.line(&format!("const {} = {} //{}", node.name, n, comment));
            }
            ConstValue::Str(s) => {
                self.w.line(&format!("const {} = \"{}\"", node.name, s));
            }
        }
        self.env.set(&node.name, val);
        Ok(())
    }

    /// A shift expression documents its operands, anything else its hex value.
    fn int_const_comment(&self, val: i64, expr: &Expr) -> Result<String> {
        if let Expr::Binary { op: op @ (BinOp::Shl | BinOp::Shr), lhs, rhs, .. } = expr {
            if let (ConstValue::Int(a), ConstValue::Int(b)) =
                (self.env.fold(lhs)?, self.env.fold(rhs)?)
            {
                return Ok(format!("({}{}{})", a, op.symbol(), b));
            }
        }
        Ok(format!("{:#x}", val))
    }

    fn id_group(&mut self, node: &IdGroupDef) {
        self.w.line("const (");
        self.w.indent();
        let mut notes = node.notes.as_slice();
        for (idx, id) in node.items.iter().enumerate() {
            if id.explicit_base.is_some() && idx > 0 {
                self.w.blank();
            }
            while let Some(first) = notes.first() {
                if id.line > first.line {
                    self.w.line(&format!("//{}", first.text));
                    notes = &notes[1..];
                } else {
                    break;
                }
            }
            self.w.line(&format!("{} = {} //hex: {:#x}", id.name, id.value, id.value));
        }
        self.w.dedent();
        self.w.line(")");

        self.id_group_name(node);
    }

    fn id_group_name(&mut self, node: &IdGroupDef) {
        self.w.blank();
        self.w.line(&format!("func {}_name(id uint16)(string, bool) {{", node.name));
        self.w.indent();
        self.w.line("switch id {");
        for (idx, id) in node.items.iter().enumerate() {
            if idx != 0 {
                self.w.blank();
            }
            self.w.line(&format!("case {}:", id.name));
            self.w.indent();
            self.w.line(&format!("return \"{}\", true", id.name));
            self.w.dedent();
        }
        self.w.line("}");
        self.w.line("return \"\", false");
        self.w.dedent();
        self.w.line("}");
    }

    fn type_alias(&mut self, types: &TypeTable, node: &TypeAliasDef) -> Result<()> {
        let impl_name = go_type_name(types, node.ty)?;
        self.w.line(&format!("type {} {};", node.name, impl_name));
        if let Some(s) = types.as_struct(node.ty) {
            self.msg_codec(types, &node.name, s)?;
        }
        Ok(())
    }

    fn msg_define(&mut self, types: &TypeTable, tid: TypeId) -> Result<()> {
        let s = match types.as_struct(tid) {
            Some(s) => s,
            None => return emit_error(format!("message is not a struct: {}", types.describe(tid))),
        };

        self.w.line("");
        self.w.line(&format!("type {} struct {{", s.name));
        self.w.indent();
        for f in &s.fields {
            if let Some(p) = types.as_prim(f.ty) {
                match &f.comment {
                    Some(c) => self.w.line(&format!(
                        "{} {} //{} {}",
                        f.name,
                        go_type_name(types, f.ty)?,
                        p.name(),
                        c.text
                    )),
                    None => self.w.line(&format!(
                        "{} {} //{}",
                        f.name,
                        go_type_name(types, f.ty)?,
                        p.name()
                    )),
                }
            } else if types.as_struct(f.ty).is_some() {
                match &f.comment {
                    Some(c) => self.w.line(&format!(
                        "{} {} //{}",
                        f.name,
                        go_type_name(types, f.ty)?,
                        c.text
                    )),
                    None => self.w.line(&format!("{} {}", f.name, go_type_name(types, f.ty)?)),
                }
            } else if let Some(elem) = types.as_array_elem(f.ty) {
                let limit = match &f.limit {
                    Some(l) => l,
                    None => {
                        return emit_error(format!(
                            "array field without limit: {}, line: {}",
                            f.name, f.line
                        ));
                    }
                };
                let cap = match limit_field_max(s, &limit.name) {
                    Some(max) => max.name.clone(),
                    None => limit.name.clone(),
                };
                self.w.line(&format!("{} [{}]{}", f.name, cap, go_type_name(types, elem)?));
            } else {
                return emit_error(format!(
                    "unsupported field type: {} {}, line: {}",
                    f.name,
                    types.describe(f.ty),
                    f.line
                ));
            }
        }
        self.w.dedent();
        self.w.line("}");
        self.w.line("");

        self.msg_codec(types, &s.name, s)
    }

    fn msg_codec(&mut self, types: &TypeTable, type_name: &str, s: &StructDef) -> Result<()> {
        self.msg_encode(types, type_name, s)?;
        self.w.line("");
        self.msg_decode(types, type_name, s)
    }

    fn exist_open(&mut self, f: &FieldDecl) -> bool {
        if let Some(cond) = &f.exist_if {
            let text = lower_cond(cond, true, &go_name_ref, &go_bin_op);
            self.w.line(&format!("if {} {{", text));
            self.w.indent();
            true
        } else {
            false
        }
    }

    fn exist_close(&mut self, opened: bool) {
        if opened {
            self.w.dedent();
            self.w.line("}");
        }
    }

    fn msg_encode(&mut self, types: &TypeTable, type_name: &str, s: &StructDef) -> Result<()> {
        self.w.line(&format!("func encode_{}(buf io.Writer, m *{}) int {{", type_name, type_name));
        self.w.indent();

        let mut notes = s.notes.as_slice();
        let mut has_tmp = false;
        let mut bit_aggr = false;
        let mut bits: u32 = 0;
        let mut xor_var: Option<NameRef> = None;

        for f in &s.fields {
            while let Some(first) = notes.first() {
                if f.line > first.line {
                    self.w.line(&format!("//{}", first.text));
                    notes = &notes[1..];
                } else {
                    break;
                }
            }

            if let Some(p) = types.as_prim(f.ty) {
                let width = match p.bit_width() {
                    Some(w) => w,
                    None => {
                        return emit_error(format!(
                            "encode does not support non-wire type {} for field {}, line: {}",
                            p.name(),
                            f.name,
                            f.line
                        ));
                    }
                };
                if bit_aggr {
                    let mask = (1u64 << width) - 1;
                    bits += width;
                    if bits > 8 {
                        return emit_error(format!(
                            "bit aggregation overflow at field {}, line: {}",
                            f.name, f.line
                        ));
                    }
                    let shift = 8 - bits;
                    if shift == 0 {
                        self.w.line(&format!("tmp |= m.{} & {:#x}", f.name, mask));
                    } else {
                        self.w.line(&format!("tmp |= (m.{} & {:#x}) << {}", f.name, mask, shift));
                    }
                    if bits == 8 {
                        if let Some(x) = &xor_var {
                            self.w.line(&format!("tmp ^= uint8({})", x.name));
                        }
                        self.w.line("if binary.Write(buf, binary.BigEndian, tmp) != nil { return -1 }");
                        self.w.blank();
                        bit_aggr = false;
                        bits = 0;
                        xor_var = None;
                    }
                } else if width % 8 == 0 {
                    if p.is_var_int() {
                        return emit_error(format!(
                            "var int encode is not supported by the go backend, field: {}, line: {}",
                            f.name, f.line
                        ));
                    }
                    let opened = self.exist_open(f);
                    if let Some(max) = &f.max {
                        self.w.blank();
                        self.w.line(&format!(
                            "if m.{} > {} {{ m.{} = {} }}",
                            f.name, max.name, f.name, max.name
                        ));
                    }
                    match &f.xor {
                        None => self.w.line(&format!(
                            "if binary.Write(buf, binary.BigEndian, m.{}) != nil {{ return -1 }}",
                            f.name
                        )),
                        Some(x) => self.w.line(&format!(
                            "if binary.Write(buf, binary.BigEndian, m.{}^{}({})) != nil {{ return -1 }}",
                            f.name,
                            go_type_name(types, f.ty)?,
                            x.name
                        )),
                    }
                    self.exist_close(opened);
                } else {
                    if !has_tmp {
                        has_tmp = true;
                        self.w.line("tmp := uint8(0)");
                    } else {
                        self.w.line("tmp = 0");
                    }
                    xor_var = f.xor.clone();
                    bits = width;
                    let mask = (1u64 << width) - 1;
                    self.w.line(&format!(
                        "tmp |= (m.{} & {:#x}) << {}",
                        f.name,
                        mask,
                        8 - bits
                    ));
                    bit_aggr = true;
                }
            } else if let Some(sub) = types.as_struct(f.ty) {
                let opened = self.exist_open(f);
                self.w.line(&format!(
                    "if encode_{}(buf, &m.{}) < 0 {{ return -1 }}",
                    sub.name, f.name
                ));
                self.exist_close(opened);
            } else if let Some(elem) = types.as_array_elem(f.ty) {
                self.array_encode(types, s, f, elem)?;
            } else {
                return emit_error(format!(
                    "encode unsupported type: {} {}, line: {}",
                    f.name,
                    types.describe(f.ty),
                    f.line
                ));
            }
        }

        self.w.line("return 0");
        self.w.dedent();
        self.w.line("}");
        Ok(())
    }

    fn array_encode(
        &mut self,
        types: &TypeTable,
        s: &StructDef,
        f: &FieldDecl,
        elem: TypeId,
    ) -> Result<()> {
        let limit = match &f.limit {
            Some(l) => l,
            None => {
                return emit_error(format!(
                    "array field without limit: {}, line: {}",
                    f.name, f.line
                ));
            }
        };
        let lim_is_field = limit_field_max(s, &limit.name).is_some();
        let opened = self.exist_open(f);

        // Byte arrays write as one slice sized by the limit value.
        if types.as_prim(elem).and_then(Prim::bit_width) == Some(8) {
            self.w.blank();
            if lim_is_field {
                self.w.line(&format!(
                    "if binary.Write(buf, binary.BigEndian, m.{}[0:m.{}]) != nil {{ return -1 }}",
                    f.name, limit.name
                ));
            } else {
                self.w.line(&format!(
                    "if binary.Write(buf, binary.BigEndian, m.{}[0:{}]) != nil {{ return -1 }}",
                    f.name, limit.name
                ));
            }
            self.exist_close(opened);
            return Ok(());
        }

        if lim_is_field {
            self.w.line(&format!("for i := 0; i < int(m.{}); i++ {{", limit.name));
        } else {
            self.w.line(&format!("for i := 0; i < int({}); i++ {{", limit.name));
        }
        self.w.indent();
        if let Some(p) = types.as_prim(elem) {
            match p.bit_width() {
                Some(bn) if bn % 8 == 0 && !p.is_var_int() => {
                    self.w.line(&format!(
                        "if binary.Write(buf, binary.BigEndian, m.{}[i]) != nil {{ return -1 }}",
                        f.name
                    ));
                }
                _ => {
                    return emit_error(format!(
                        "unsupported array element type encode: {} {}, line: {}",
                        f.name,
                        p.name(),
                        f.line
                    ));
                }
            }
        } else if let Some(es) = types.as_struct(elem) {
            self.w.line(&format!(
                "if encode_{}(buf, &m.{}[i]) < 0 {{ return -1 }}",
                es.name, f.name
            ));
        } else {
            return emit_error(format!(
                "unsupported array element type encode: {} {}, line: {}",
                f.name,
                types.describe(elem),
                f.line
            ));
        }
        self.w.dedent();
        self.w.line("}");
        self.w.blank();
        self.exist_close(opened);
        Ok(())
    }

    fn msg_decode(&mut self, types: &TypeTable, type_name: &str, s: &StructDef) -> Result<()> {
        self.w.line(&format!("func decode_{}(buf io.Reader, m *{}) int {{", type_name, type_name));
        self.w.indent();

        let mut has_tmp = false;
        let mut bit_aggr = false;
        let mut bits: u32 = 0;

        for f in &s.fields {
            if let Some(p) = types.as_prim(f.ty) {
                let width = match p.bit_width() {
                    Some(w) => w,
                    None => {
                        return emit_error(format!(
                            "decode does not support non-wire type {} for field {}, line: {}",
                            p.name(),
                            f.name,
                            f.line
                        ));
                    }
                };
                if bit_aggr {
                    let mask = (1u64 << width) - 1;
                    bits += width;
                    if bits > 8 {
                        return emit_error(format!(
                            "bit aggregation overflow at field {}, line: {}",
                            f.name, f.line
                        ));
                    }
                    let shift = 8 - bits;
                    if shift > 0 {
                        self.w.line(&format!("m.{} = (tmp >> {}) & {:#x}", f.name, shift, mask));
                    } else {
                        self.w.line(&format!("m.{} = tmp & {:#x}", f.name, mask));
                    }
                    if let Some(equ) = &f.equ {
                        self.w.line(&format!("if m.{} != {} {{ return -1 }}", f.name, equ.name));
                    }
                    if bits == 8 {
                        bit_aggr = false;
                        bits = 0;
                    }
                } else if width % 8 == 0 {
                    if p.is_var_int() {
                        return emit_error(format!(
                            "var int decode is not supported by the go backend, field: {}, line: {}",
                            f.name, f.line
                        ));
                    }
                    let opened = self.exist_open(f);
                    self.w.line(&format!(
                        "if binary.Read(buf, binary.BigEndian, &m.{}) != nil {{ return -1 }}",
                        f.name
                    ));
                    if let Some(x) = &f.xor {
                        self.w.line(&format!(
                            "m.{} ^= {}({})",
                            f.name,
                            go_type_name(types, f.ty)?,
                            x.name
                        ));
                    }
                    if let Some(max) = &f.max {
                        self.w.line(&format!("if m.{} > {} {{ return -1 }}", f.name, max.name));
                    } else if let Some(equ) = &f.equ {
                        self.w.line(&format!("if m.{} != {} {{ return -1 }}", f.name, equ.name));
                    }
                    self.exist_close(opened);
                } else {
                    if !has_tmp {
                        has_tmp = true;
                        self.w.line("tmp := uint8(0)");
                    } else {
                        self.w.blank();
                        self.w.line("tmp = 0");
                    }
                    bits = width;
                    let mask = (1u64 << width) - 1;
                    self.w.line("if binary.Read(buf, binary.BigEndian, &tmp) != nil { return -1 }");
                    if let Some(x) = &f.xor {
                        self.w.line(&format!("tmp ^= uint8({})", x.name));
                    }
                    self.w.line(&format!("m.{} = (tmp >> {}) & {:#x}", f.name, 8 - bits, mask));
                    if let Some(equ) = &f.equ {
                        self.w.line(&format!("if m.{} != {} {{ return -1 }}", f.name, equ.name));
                    }
                    bit_aggr = true;
                }
            } else if let Some(sub) = types.as_struct(f.ty) {
                let opened = self.exist_open(f);
                self.w.line(&format!(
                    "if decode_{}(buf, &m.{}) < 0 {{ return -1 }}",
                    sub.name, f.name
                ));
                self.exist_close(opened);
            } else if let Some(elem) = types.as_array_elem(f.ty) {
                self.array_decode(types, s, f, elem)?;
            } else {
                return emit_error(format!(
                    "decode unsupported type: {} {}, line: {}",
                    f.name,
                    types.describe(f.ty),
                    f.line
                ));
            }
        }

        self.w.line("return 0");
        self.w.dedent();
        self.w.line("}");
        Ok(())
    }

    fn array_decode(
        &mut self,
        types: &TypeTable,
        s: &StructDef,
        f: &FieldDecl,
        elem: TypeId,
    ) -> Result<()> {
        let limit = match &f.limit {
            Some(l) => l,
            None => {
                return emit_error(format!(
                    "array field without limit: {}, line: {}",
                    f.name, f.line
                ));
            }
        };
        let lim_is_field = limit_field_max(s, &limit.name).is_some();
        let opened = self.exist_open(f);

        // Byte arrays read as one slice sized by the limit value.
        if types.as_prim(elem).and_then(Prim::bit_width) == Some(8) {
            if lim_is_field {
                self.w.line(&format!(
                    "if binary.Read(buf, binary.BigEndian, m.{}[:m.{}]) != nil {{ return -1 }}",
                    f.name, limit.name
                ));
            } else {
                self.w.line(&format!(
                    "if binary.Read(buf, binary.BigEndian, m.{}[:]) != nil {{ return -1 }}",
                    f.name
                ));
            }
            self.exist_close(opened);
            return Ok(());
        }

        if lim_is_field {
            self.w.line(&format!("for i := 0; i < int(m.{}); i++ {{", limit.name));
        } else {
            self.w.line(&format!("for i := 0; i < int({}); i++ {{", limit.name));
        }
        self.w.indent();
        if let Some(p) = types.as_prim(elem) {
            match p.bit_width() {
                Some(bn) if bn % 8 == 0 && !p.is_var_int() => {
                    self.w.line(&format!(
                        "if binary.Read(buf, binary.BigEndian, &m.{}[i]) != nil {{ return -1 }}",
                        f.name
                    ));
                }
                _ => {
                    return emit_error(format!(
                        "unsupported array element type decode: {} {}, line: {}",
                        f.name,
                        p.name(),
                        f.line
                    ));
                }
            }
        } else if let Some(es) = types.as_struct(elem) {
            self.w.line(&format!(
                "if decode_{}(buf, &m.{}[i]) < 0 {{ return -1 }}",
                es.name, f.name
            ));
        } else {
            return emit_error(format!(
                "unsupported array element type decode: {} {}, line: {}",
                f.name,
                types.describe(elem),
                f.line
            ));
        }
        self.w.dedent();
        self.w.line("}");
        self.w.blank();
        self.exist_close(opened);
        Ok(())
    }

    /// One dispatch function per direction: a switch over every msg id in
    /// declaration order. Bound ids forward to the message codec, unbound
    /// ids answer 0, unknown ids answer -1.
    fn bind_dispatch(&mut self, program: &Program, dir: &str) -> Result<()> {
        let buf_ty = if dir == "encode" { "io.Writer" } else { "io.Reader" };
        self.w.blank();
        self.w.line(&format!(
            "func {}{}MsgById(buf {}, mid uint16, msg interface{{}}) int {{",
            dir,
            upper_first(&program.mspace),
            buf_ty
        ));
        self.w.indent();
        self.w.line("switch mid {");
        let mut first = true;
        for decl in &program.decls {
            let g = match decl {
                Decl::IdGroup(g) if g.is_msg_id => g,
                _ => continue,
            };
            for item in &g.items {
                if !first {
                    self.w.blank();
                }
                first = false;
                self.w.line(&format!("case {}:", item.name));
                self.w.indent();
                match &item.bound_msg {
                    Some(msg) => self.w.line(&format!(
                        "return {}_{}(buf, msg.(*{}))",
                        dir, msg, msg
                    )),
                    None => self.w.line("return 0"),
                }
                self.w.dedent();
            }
        }
        self.w.line("}");
        self.w.blank();
        self.w.line("return -1");
        self.w.dedent();
        self.w.line("}");
        self.w.blank();
        Ok(())
    }
}
