//! End-to-end compiles: full pipeline into the in-memory sink, asserting on
//! the emitted Go lines.

use protodsl::{compile, CompileError, EmitOptions, Mode};

fn compile_src(src: &str) -> String {
    let opts = EmitOptions { source_name: "test.proto".to_string() };
    compile(src, Mode::Go, &opts).expect("compile")
}

fn compile_err(src: &str) -> CompileError {
    let opts = EmitOptions { source_name: "test.proto".to_string() };
    compile(src, Mode::Go, &opts).expect_err("expected compile failure")
}

/// Assert `needle` appears as a whole (trimmed) emitted line.
fn assert_line(code: &str, needle: &str) {
    assert!(
        code.lines().any(|l| l.trim() == needle),
        "missing line '{}' in output:\n{}",
        needle,
        code
    );
}

fn line_index(code: &str, needle: &str) -> usize {
    code.lines()
        .position(|l| l.trim() == needle)
        .unwrap_or_else(|| panic!("missing line '{}' in output:\n{}", needle, code))
}

// ==================== Minimal message ====================

#[test]
fn two_field_message_emits_record_and_codec() {
    let code = compile_src("mspace test;\ndefmsg Hello { a u8; b u8 }\n");
    assert_line(&code, "type Hello struct {");
    assert_line(&code, "a uint8 //u8");
    assert_line(&code, "b uint8 //u8");
    assert_line(&code, "func encode_Hello(buf io.Writer, m *Hello) int {");
    assert_line(&code, "func decode_Hello(buf io.Reader, m *Hello) int {");

    // Octets read/written in declared order.
    let wa = line_index(&code, "if binary.Write(buf, binary.BigEndian, m.a) != nil { return -1 }");
    let wb = line_index(&code, "if binary.Write(buf, binary.BigEndian, m.b) != nil { return -1 }");
    assert!(wa < wb, "fields out of order:\n{}", code);
    let ra = line_index(&code, "if binary.Read(buf, binary.BigEndian, &m.a) != nil { return -1 }");
    let rb = line_index(&code, "if binary.Read(buf, binary.BigEndian, &m.b) != nil { return -1 }");
    assert!(ra < rb, "fields out of order:\n{}", code);
}

#[test]
fn header_names_source_and_generator() {
    let code = compile_src("mspace test;\ndefmsg M { a u8 }\n");
    assert!(code.starts_with("/*\n"), "missing header:\n{}", code);
    assert!(code.contains("code auto generated from: test.proto"), "got:\n{}", code);
    assert!(code.contains("generator version 1.0; mode: golang"), "got:\n{}", code);
}

// ==================== Bit packing ====================

#[test]
fn nibble_pair_shares_one_octet() {
    let code = compile_src("mspace test;\ndefmsg Flags { hi u4; lo u4 }\n");
    assert_line(&code, "tmp := uint8(0)");
    assert_line(&code, "tmp |= (m.hi & 0xf) << 4");
    assert_line(&code, "tmp |= m.lo & 0xf");
    assert_line(&code, "if binary.Write(buf, binary.BigEndian, tmp) != nil { return -1 }");
    assert_line(&code, "if binary.Read(buf, binary.BigEndian, &tmp) != nil { return -1 }");
    assert_line(&code, "m.hi = (tmp >> 4) & 0xf");
    assert_line(&code, "m.lo = tmp & 0xf");
}

#[test]
fn three_field_run_shifts_accumulate() {
    let code = compile_src("mspace test;\ndefmsg P { a u3; b u4; c u1 }\n");
    assert_line(&code, "tmp |= (m.a & 0x7) << 5");
    assert_line(&code, "tmp |= (m.b & 0xf) << 1");
    assert_line(&code, "tmp |= m.c & 0x1");
    assert_line(&code, "m.a = (tmp >> 5) & 0x7");
    assert_line(&code, "m.b = (tmp >> 1) & 0xf");
    assert_line(&code, "m.c = tmp & 0x1");
}

#[test]
fn unclosed_run_fails_compile() {
    let err = compile_err("mspace test;\ndefmsg Bad { hi u4; mid u2 }\n");
    assert!(err.to_string().contains("unclosed 6-bit"), "got: {}", err);
}

#[test]
fn second_run_reuses_tmp() {
    let code = compile_src("mspace test;\ndefmsg M { a u4; b u4; c u4; d u4 }\n");
    assert_line(&code, "tmp := uint8(0)");
    assert_line(&code, "tmp = 0");
}

// ==================== Variable-length arrays ====================

#[test]
fn byte_array_uses_limit_and_max() {
    let src = "mspace test;\ndefmsg Buf { len u8 -> max MAX; data []u8 -> limit by len }\nconst MAX 256\n";
    let code = compile_src(src);
    assert_line(&code, "data [MAX]uint8");
    assert_line(&code, "if m.len > MAX { m.len = MAX }");
    assert_line(&code, "if binary.Write(buf, binary.BigEndian, m.data[0:m.len]) != nil { return -1 }");
    assert_line(&code, "if m.len > MAX { return -1 }");
    assert_line(&code, "if binary.Read(buf, binary.BigEndian, m.data[:m.len]) != nil { return -1 }");
}

#[test]
fn const_limited_array_is_fixed_size() {
    let src = "mspace test;\nconst N 4\ndefmsg M { data []u8 -> limit by N }\n";
    let code = compile_src(src);
    assert_line(&code, "data [N]uint8");
    assert_line(&code, "if binary.Write(buf, binary.BigEndian, m.data[0:N]) != nil { return -1 }");
    assert_line(&code, "if binary.Read(buf, binary.BigEndian, m.data[:]) != nil { return -1 }");
}

#[test]
fn wide_element_array_loops() {
    let src = "mspace test;\ndefmsg M { cnt u8 -> max MAX; vals []u32 -> limit by cnt }\nconst MAX 8\n";
    let code = compile_src(src);
    assert_line(&code, "vals [MAX]uint32");
    assert_line(&code, "for i := 0; i < int(m.cnt); i++ {");
    assert_line(&code, "if binary.Write(buf, binary.BigEndian, m.vals[i]) != nil { return -1 }");
    assert_line(&code, "if binary.Read(buf, binary.BigEndian, &m.vals[i]) != nil { return -1 }");
}

#[test]
fn struct_element_array_recurses() {
    let src = "mspace test;\n\
               defmsg Point { x u16; y u16 }\n\
               defmsg Path { cnt u8 -> max MAX; pts []Point -> limit by cnt }\n\
               const MAX 16\n";
    let code = compile_src(src);
    assert_line(&code, "pts [MAX]Point");
    assert_line(&code, "if encode_Point(buf, &m.pts[i]) < 0 { return -1 }");
    assert_line(&code, "if decode_Point(buf, &m.pts[i]) < 0 { return -1 }");
}

// ==================== Modifiers on whole-byte fields ====================

#[test]
fn xor_applies_before_write_and_after_read() {
    let src = "mspace test;\nconst MASK 0x5a5a\ndefmsg M { seq u16 -> xor MASK }\n";
    let code = compile_src(src);
    assert_line(&code, "if binary.Write(buf, binary.BigEndian, m.seq^uint16(MASK)) != nil { return -1 }");
    assert_line(&code, "m.seq ^= uint16(MASK)");
}

#[test]
fn xor_on_run_opener_masks_whole_octet() {
    let src = "mspace test;\nconst MASK 0x5a\ndefmsg M { hi u4 -> xor MASK; lo u4 }\n";
    let code = compile_src(src);
    let lines: Vec<&str> = code.lines().map(str::trim).collect();
    // Encode: mask just before the write; decode: unmask right after the read.
    let enc_xor = line_index(&code, "tmp ^= uint8(MASK)");
    let enc_write = line_index(&code, "if binary.Write(buf, binary.BigEndian, tmp) != nil { return -1 }");
    assert_eq!(enc_xor + 1, enc_write, "xor must precede the write:\n{}", code);
    let dec_read = line_index(&code, "if binary.Read(buf, binary.BigEndian, &tmp) != nil { return -1 }");
    assert_eq!(lines[dec_read + 1], "tmp ^= uint8(MASK)", "unmask must follow the read:\n{}", code);
}

#[test]
fn equal_rejects_on_decode_only() {
    let src = "mspace test;\nconst VER 3\ndefmsg M { ver u8 -> equal VER }\n";
    let code = compile_src(src);
    assert_line(&code, "if m.ver != VER { return -1 }");
    // Encode side writes unconditionally.
    assert_line(&code, "if binary.Write(buf, binary.BigEndian, m.ver) != nil { return -1 }");
}

#[test]
fn nested_struct_field_recurses() {
    let src = "mspace test;\ndefmsg Hdr { tag u8 }\ndefmsg M { hdr Hdr; body u16 }\n";
    let code = compile_src(src);
    assert_line(&code, "if encode_Hdr(buf, &m.hdr) < 0 { return -1 }");
    assert_line(&code, "if decode_Hdr(buf, &m.hdr) < 0 { return -1 }");
}

#[test]
fn forward_referenced_struct_field_compiles() {
    let src = "mspace test;\ndefmsg Outer { inner Inner }\ndefmsg Inner { x u8 }\n";
    let code = compile_src(src);
    assert_line(&code, "inner Inner");
    assert_line(&code, "if encode_Inner(buf, &m.inner) < 0 { return -1 }");
}

// ==================== exist if ====================

#[test]
fn exist_if_wraps_field_codec() {
    let src = "mspace test;\ndefmsg M { kind u8; opt u16 -> exist if this.kind == 1 }\n";
    let code = compile_src(src);
    assert_line(&code, "if m.kind == 1 {");
    let cond = line_index(&code, "if m.kind == 1 {");
    let write = line_index(&code, "if binary.Write(buf, binary.BigEndian, m.opt) != nil { return -1 }");
    assert!(cond < write, "condition must wrap the write:\n{}", code);
}

#[test]
fn exist_if_compound_condition_parenthesizes() {
    let src = "mspace test;\nconst LO 1\nconst HI 5\ndefmsg M { kind u8; opt u16 -> exist if this.kind >= LO && this.kind <= HI }\n";
    let code = compile_src(src);
    assert_line(&code, "if (m.kind >= LO) && (m.kind <= HI) {");
}

// ==================== Constants and comments ====================

#[test]
fn int_const_carries_hex_comment() {
    let code = compile_src("mspace test;\nconst MAX 256\ndefmsg M { a u8 }\n");
    assert_line(&code, "const MAX = 256 //0x100");
}

#[test]
fn shift_const_documents_operands() {
    let code = compile_src("mspace test;\nconst FLAG 1 << 6\ndefmsg M { a u8 }\n");
    assert_line(&code, "const FLAG = 64 //(1<<6)");
}

#[test]
fn string_const_emits_quoted() {
    let code = compile_src("mspace test;\nconst NAME \"chat\"\ndefmsg M { a u8 }\n");
    assert_line(&code, "const NAME = \"chat\"");
}

#[test]
fn const_may_reference_earlier_consts_and_ids() {
    let src = "mspace test;\ndefmid Mid { BASE = 16 }\nconst NEXT BASE + 1\ndefmsg M { a u8 }\nbind BASE M\n";
    let code = compile_src(src);
    assert_line(&code, "const NEXT = 17 //0x11");
}

#[test]
fn doc_comments_round_trip() {
    let src = "mspace test;\n//*top level note\ndefmsg M { a u8 //*keep me\n}\n";
    let code = compile_src(src);
    assert_line(&code, "//*top level note");
    assert_line(&code, "a uint8 //u8 *keep me");
}

#[test]
fn message_notes_interleave_before_fields() {
    let src = "mspace test;\ndefmsg M {\n//*first field below\na u8\nb u8\n}\n";
    let code = compile_src(src);
    let note = line_index(&code, "//*first field below");
    let write = line_index(&code, "if binary.Write(buf, binary.BigEndian, m.a) != nil { return -1 }");
    assert!(note < write, "note must precede its field:\n{}", code);
}

// ==================== Id groups ====================

#[test]
fn id_group_emits_constants_and_lookup() {
    let src = "mspace test;\ndefid Errs { OK = 0, BAD, WORSE = 16 }\ndefmsg M { a u8 }\n";
    let code = compile_src(src);
    assert_line(&code, "const (");
    assert_line(&code, "OK = 0 //hex: 0x0");
    assert_line(&code, "BAD = 1 //hex: 0x1");
    assert_line(&code, "WORSE = 16 //hex: 0x10");
    assert_line(&code, "func Errs_name(id uint16)(string, bool) {");
    assert_line(&code, "case BAD:");
    assert_line(&code, "return \"BAD\", true");
    assert_line(&code, "return \"\", false");
}

// ==================== Bind dispatch ====================

#[test]
fn dispatch_routes_bound_ids_and_zeroes_unbound() {
    let src = "mspace test;\ndefmid M { ON = 1, OFF }\ndefmsg Light { state u8 }\nbind ON Light\n";
    let code = compile_src(src);
    assert_line(&code, "func encodeTestMsgById(buf io.Writer, mid uint16, msg interface{}) int {");
    assert_line(&code, "func decodeTestMsgById(buf io.Reader, mid uint16, msg interface{}) int {");
    assert_line(&code, "case ON:");
    assert_line(&code, "return encode_Light(buf, msg.(*Light))");
    assert_line(&code, "return decode_Light(buf, msg.(*Light))");
    assert_line(&code, "case OFF:");
    assert_line(&code, "return 0");
    assert_line(&code, "return -1");
}

#[test]
fn no_bind_no_dispatch() {
    let src = "mspace test;\ndefmid M { ON = 1 }\ndefmsg Light { state u8 }\n";
    let code = compile_src(src);
    assert!(!code.contains("MsgById"), "unexpected dispatch:\n{}", code);
}

#[test]
fn plain_id_groups_stay_out_of_dispatch() {
    let src = "mspace test;\ndefid E { A = 7 }\ndefmid M { ON = 1 }\ndefmsg Light { state u8 }\nbind ON Light\n";
    let code = compile_src(src);
    assert_line(&code, "case ON:");
    assert!(
        !code.lines().any(|l| l.trim() == "case A:"),
        "plain id leaked into dispatch:\n{}",
        code
    );
}

// ==================== Type aliases ====================

#[test]
fn alias_of_primitive_emits_type_line() {
    let code = compile_src("mspace test;\ntype Octet u8\ndefmsg M { a Octet }\n");
    assert_line(&code, "type Octet uint8;");
    assert_line(&code, "a uint8 //u8");
}

#[test]
fn alias_of_struct_gets_its_own_codec() {
    let src = "mspace test;\ndefmsg Body { x u8 }\ntype Payload Body\ndefmsg M { a u8 }\n";
    let code = compile_src(src);
    assert_line(&code, "type Payload Body;");
    assert_line(&code, "func encode_Payload(buf io.Writer, m *Payload) int {");
    assert_line(&code, "func decode_Payload(buf io.Reader, m *Payload) int {");
}

// ==================== Rejections and hygiene ====================

#[test]
fn var_int_rejected_at_emission() {
    let err = compile_err("mspace test;\ndefmsg M { v v32 }\n");
    assert!(err.to_string().contains("var int"), "got: {}", err);
}

#[test]
fn int_typed_field_rejected_at_emission() {
    let err = compile_err("mspace test;\ndefmsg M { n int }\n");
    assert!(err.to_string().contains("emit error"), "got: {}", err);
}

#[test]
fn no_consecutive_blank_lines() {
    let src = "mspace test;\n\
               const MASK 0x55\n\
               defmid Mid { A = 1, B }\n\
               defmsg X { hi u4; lo u4; seq u32 -> xor MASK; len u8 -> max MAX; data []u8 -> limit by len }\n\
               const MAX 32\n\
               bind A X\n";
    let code = compile_src(src);
    assert!(!code.contains("\n\n\n"), "consecutive blank lines:\n{}", code);
}

#[test]
fn failed_compile_produces_no_output() {
    let opts = EmitOptions { source_name: "test.proto".to_string() };
    let result = compile("mspace test;\ndefmsg Bad { hi u4 }\n", Mode::Go, &opts);
    assert!(result.is_err());
}
