//! Front-end tests: parse acceptance/rejection and semantic rules
//! (bit packing, modifiers, id numbering, bindings).

use protodsl::ast::{Decl, Program};
use protodsl::{analyze, parse, CompileError};

fn analyzed(src: &str) -> Result<Program, CompileError> {
    let mut program = parse(src)?;
    analyze(&mut program)?;
    Ok(program)
}

fn expect_err(src: &str, needle: &str) {
    match analyzed(src) {
        Ok(_) => panic!("expected error containing '{}', but compiled", needle),
        Err(e) => {
            let msg = e.to_string();
            assert!(msg.contains(needle), "expected '{}' in error: {}", needle, msg);
        }
    }
}

// ==================== Structure ====================

#[test]
fn minimal_message_analyzes() {
    analyzed("mspace test;\ndefmsg Hello { a u8; b u8 }\n").expect("analyze");
}

#[test]
fn mspace_required() {
    expect_err("defmsg Hello { a u8 }\n", "mspace not declared");
}

#[test]
fn duplicate_toplevel_symbol_reports_both_lines() {
    let src = "mspace t;\nconst A 1\ndefmsg A { x u8 }\n";
    match analyzed(src) {
        Err(e) => {
            let msg = e.to_string();
            assert!(msg.contains("duplicate symbol: 'A'"), "got: {}", msg);
            assert!(msg.contains("line: 3") && msg.contains("line: 2"), "got: {}", msg);
        }
        Ok(_) => panic!("expected duplicate symbol error"),
    }
}

#[test]
fn extern_names_are_visible_to_expressions() {
    let src = "mspace t;\nextern seed u32\ndefmsg M { a u8 -> exist if seed != 0 }\n";
    analyzed(src).expect("analyze");
}

// ==================== Bit aggregation ====================

#[test]
fn nibble_pair_packs() {
    analyzed("mspace t;\ndefmsg Flags { hi u4; lo u4 }\n").expect("analyze");
}

#[test]
fn eight_single_bits_pack() {
    let src = "mspace t;\ndefmsg Bits { b0 u1; b1 u1; b2 u1; b3 u1; b4 u1; b5 u1; b6 u1; b7 u1 }\n";
    analyzed(src).expect("analyze");
}

#[test]
fn run_can_close_and_reopen() {
    let src = "mspace t;\ndefmsg M { a u4; b u4; c u8; d u2; e u6 }\n";
    analyzed(src).expect("analyze");
}

#[test]
fn unclosed_run_rejected() {
    expect_err(
        "mspace t;\ndefmsg Bad { hi u4; mid u2 }\n",
        "unclosed 6-bit aggregation run",
    );
}

#[test]
fn run_overflow_rejected() {
    expect_err(
        "mspace t;\ndefmsg Bad { a u4; b u2; c u4 }\n",
        "does not fit the 8-bit boundary",
    );
}

#[test]
fn whole_byte_field_inside_run_rejected() {
    expect_err(
        "mspace t;\ndefmsg Bad { a u4; b u8; c u4 }\n",
        "does not fit the 8-bit boundary",
    );
}

#[test]
fn non_integer_inside_run_rejected() {
    let src = "mspace t;\ndefmsg Inner { x u8 }\ndefmsg Bad { a u4; s Inner; b u4 }\n";
    expect_err(src, "not an integer");
}

// ==================== Arrays and modifiers ====================

#[test]
fn array_without_limit_rejected() {
    expect_err(
        "mspace t;\ndefmsg Bad { data []u8 }\n",
        "must be limited by one field or const",
    );
}

#[test]
fn array_limited_by_const_declared_later() {
    // Top-level names resolve regardless of declaration order.
    let src = "mspace t;\ndefmsg Buf { data []u8 -> limit by LEN }\nconst LEN 16\n";
    analyzed(src).expect("analyze");
}

#[test]
fn modifier_must_reference_integer() {
    let src = "mspace t;\nconst S \"abc\"\ndefmsg Bad { a u8 -> max S }\n";
    expect_err(src, "should be type int");
}

#[test]
fn limit_naming_a_message_rejected() {
    let src = "mspace t;\ndefmsg Other { x u8 }\ndefmsg Bad { data []u8 -> limit by Other }\n";
    expect_err(src, "should be type int");
}

#[test]
fn modifier_with_unknown_symbol_rejected() {
    expect_err(
        "mspace t;\ndefmsg Bad { a u8 -> max NOWHERE }\n",
        "symbol not found: NOWHERE",
    );
}

// ==================== xor ====================

#[test]
fn xor_on_whole_byte_field_allowed() {
    let src = "mspace t;\nconst MASK 0x5a\ndefmsg M { seq u32 -> xor MASK }\n";
    analyzed(src).expect("analyze");
}

#[test]
fn xor_on_run_opener_allowed() {
    let src = "mspace t;\nconst MASK 0x5a\ndefmsg M { hi u4 -> xor MASK; lo u4 }\n";
    analyzed(src).expect("analyze");
}

#[test]
fn xor_on_run_continuation_rejected() {
    let src = "mspace t;\nconst MASK 0x5a\ndefmsg M { hi u4; lo u4 -> xor MASK }\n";
    expect_err(src, "opening an 8-bit run");
}

#[test]
fn xor_on_var_int_rejected() {
    let src = "mspace t;\nconst MASK 0x5a\ndefmsg M { v v32 -> xor MASK }\n";
    expect_err(src, "var int and xor are exclusive");
}

// ==================== exist if ====================

#[test]
fn exist_if_on_whole_byte_field_allowed() {
    let src = "mspace t;\ndefmsg M { kind u8; opt u16 -> exist if this.kind == 1 }\n";
    analyzed(src).expect("analyze");
}

#[test]
fn exist_if_on_bit_run_field_rejected() {
    let src = "mspace t;\ndefmsg M { kind u8; hi u4 -> exist if this.kind == 1; lo u4 }\n";
    expect_err(src, "not allowed on a bit-run field");
}

#[test]
fn exist_if_must_be_integer() {
    let src = "mspace t;\nconst S \"x\"\ndefmsg M { a u8 -> exist if S }\n";
    expect_err(src, "should be integer");
}

#[test]
fn exist_if_unknown_symbol_rejected() {
    let src = "mspace t;\ndefmsg M { a u8 -> exist if missing == 1 }\n";
    expect_err(src, "symbol not found: missing");
}

#[test]
fn exist_follow_above_parses_and_analyzes() {
    let src = "mspace t;\ndefmsg M { kind u8; a u16 -> exist if this.kind == 1; b u16 -> exist follow above }\n";
    let p = analyzed(src).expect("analyze");
    let tid = match &p.decls[0] {
        Decl::Message(tid) => *tid,
        other => panic!("expected message, got {:?}", other),
    };
    assert!(p.types.as_struct(tid).expect("struct").fields[2].exist_follow_above);
}

// ==================== id groups ====================

fn id_values(p: &Program, decl: usize) -> Vec<u64> {
    match &p.decls[decl] {
        Decl::IdGroup(g) => g.items.iter().map(|i| i.value).collect(),
        other => panic!("expected id group, got {:?}", other),
    }
}

#[test]
fn auto_numbering_starts_after_zero() {
    let p = analyzed("mspace t;\ndefid E { A, B, C }\n").expect("analyze");
    assert_eq!(id_values(&p, 0), vec![1, 2, 3]);
}

#[test]
fn explicit_bases_reseed_numbering() {
    let p = analyzed("mspace t;\ndefid E { A = 10, B, C = 0x20, D }\n").expect("analyze");
    assert_eq!(id_values(&p, 0), vec![10, 11, 32, 33]);
}

#[test]
fn non_monotonic_base_rejected() {
    expect_err("mspace t;\ndefid E { A = 10, B = 5 }\n", "must be greater than");
}

#[test]
fn equal_base_rejected() {
    expect_err("mspace t;\ndefid E { A = 10, B = 10 }\n", "must be greater than");
}

#[test]
fn duplicate_id_across_groups_rejected() {
    expect_err(
        "mspace t;\ndefid E1 { A }\ndefid E2 { A }\n",
        "id already defined, name: A",
    );
}

#[test]
fn empty_id_group_is_skipped() {
    // No symbol is registered, so the name stays free.
    let src = "mspace t;\ndefid E { }\nconst E 1\n";
    analyzed(src).expect("analyze");
}

// ==================== bind ====================

fn bound_of(p: &Program, decl: usize, item: usize) -> Option<String> {
    match &p.decls[decl] {
        Decl::IdGroup(g) => g.items[item].bound_msg.clone(),
        other => panic!("expected id group, got {:?}", other),
    }
}

#[test]
fn bind_fills_item_binding() {
    let src = "mspace t;\ndefmid M { ON = 1, OFF }\ndefmsg Light { state u8 }\nbind ON Light\n";
    let p = analyzed(src).expect("analyze");
    assert_eq!(bound_of(&p, 0, 0), Some("Light".to_string()));
    assert_eq!(bound_of(&p, 0, 1), None);
}

#[test]
fn bind_forward_message_reference() {
    // bind may appear before the message it names.
    let src = "mspace t;\ndefmid M { ON = 1 }\nbind ON Light\ndefmsg Light { state u8 }\n";
    let p = analyzed(src).expect("analyze");
    assert_eq!(bound_of(&p, 0, 0), Some("Light".to_string()));
}

#[test]
fn bind_nil_leaves_item_unbound() {
    let src = "mspace t;\ndefmid M { ON = 1 }\nbind ON nil\n";
    let p = analyzed(src).expect("analyze");
    assert_eq!(bound_of(&p, 0, 0), None);
}

#[test]
fn duplicate_bind_reports_both_lines() {
    let src = "mspace t;\ndefmid M { ON = 1 }\ndefmsg Light { a u8 }\ndefmsg Lamp { b u8 }\nbind ON Light\nbind ON Lamp\n";
    match analyzed(src) {
        Err(e) => {
            let msg = e.to_string();
            assert!(msg.contains("already bound at line: 5"), "got: {}", msg);
            assert!(msg.contains("duplicate bind at line: 6"), "got: {}", msg);
        }
        Ok(_) => panic!("expected duplicate bind error"),
    }
}

#[test]
fn bind_unknown_mid_rejected() {
    let src = "mspace t;\ndefmsg Light { a u8 }\nbind NOWHERE Light\n";
    expect_err(src, "mid not defined");
}

#[test]
fn bind_to_plain_id_rejected() {
    let src = "mspace t;\ndefid E { A }\ndefmsg Light { a u8 }\nbind A Light\n";
    expect_err(src, "not a msg id");
}

#[test]
fn bind_unknown_message_rejected() {
    let src = "mspace t;\ndefmid M { ON = 1 }\nbind ON Nowhere\n";
    expect_err(src, "msg name: Nowhere not found");
}

#[test]
fn bind_to_non_message_symbol_rejected() {
    let src = "mspace t;\nconst K 1\ndefmid M { ON = 1 }\nbind ON K\n";
    expect_err(src, "not a message type");
}
