use std::fs;

use anyhow::Result;
use pretty_assertions::assert_eq;

use heiretsu_core::format::script::decode::tags;
use heiretsu_core::format::script::dialogue::import_dialogue;
use heiretsu_core::format::script::reader::{read_length_prefixed_bytes, read_u32, write_u32};
use heiretsu_core::test_util::{
    condition, op, pair, parse, test_catalog, word, words, InstructionSpec, ScriptBuilder, Term,
};
use heiretsu_core::{Encoding, OpcodeCatalog, PatchConfig, RenderMode, ScriptError, ScriptFile};

fn chapter() -> Vec<u8> {
    ScriptBuilder::new("S01A", "BUNGEI", "AM")
        .symbols(&[
            "MAIN",
            "おはよう。",
            "V01_KYN0001",
            "FLAG_TALKED",
            "CH01_START",
            "Good morning!\\nYou're late.",
            "V01_HRH0002",
            "a1",
            "...",
            "V01_NGT0003",
        ])
        .block(
            4,
            vec![
                InstructionSpec::new(2, op::EV_MODE).param(tags::BOOL, word(1)),
                InstructionSpec::new(3, op::WAIT).param(tags::TIME, words(&[0x201, 0x300, 30])),
            ],
        )
        .block(
            0,
            vec![
                InstructionSpec::new(6, op::SET)
                    .unknown(0)
                    .param(tags::INT, pair(0x304, 3))
                    .param(tags::INT, pair(0x300, 1)),
                InstructionSpec::new(8, op::JUMP)
                    .jump_to(1, 2)
                    .param(
                        tags::CONDITION,
                        condition(&[Term::new(0x83, 0, (0x304, 3), (0x300, 1))]),
                    ),
                InstructionSpec::new(12, op::MSG)
                    .param(tags::SYMBOL_INDEX, 5i16.to_be_bytes().to_vec())
                    .param(tags::INT, pair(0x303, 2)),
            ],
        )
        .block(3, vec![])
        .build()
}

/// Every header field agrees with what a fresh parse of the buffer finds.
fn assert_consistent(script: &ScriptFile) {
    let bytes = script.to_bytes();
    let header = script.header();

    let last = script.symbols().as_slice().last().unwrap();
    let (_, after_last) = read_length_prefixed_bytes(&bytes, last.offset).unwrap();
    assert_eq!(read_u32(&bytes, header.symbol_table_end_offset).unwrap() as usize, after_last);
    assert_eq!(
        read_u32(&bytes, header.block_table_end_offset).unwrap() as usize,
        after_last + 8 * script.blocks().len()
    );

    let fresh = parse(bytes);
    assert_eq!(fresh.header(), header);
    assert_eq!(fresh.symbols(), script.symbols());
    assert_eq!(fresh.dialogue(), script.dialogue());
    for (block, reparsed) in script.blocks().iter().zip(fresh.blocks()) {
        assert_eq!(block.start_offset, reparsed.start_offset);
        assert_eq!(block.invocations, reparsed.invocations);
        if let Some(first) = fresh.block_invocations(reparsed).first() {
            assert_eq!(first.address, block.start_offset as usize);
        }
    }
    let addresses = |s: &ScriptFile| s.invocations().iter().map(|i| i.address).collect::<Vec<_>>();
    assert_eq!(addresses(&fresh), addresses(script));
}

#[test]
fn untouched_script_round_trips() {
    let bytes = chapter();
    let script = parse(bytes.clone());
    assert_eq!(script.into_bytes(), bytes);
}

#[test]
fn chapter_block_example() {
    let script = parse(chapter());
    let block = &script.blocks()[0];

    assert_eq!(block.name_index, 4);
    assert_eq!(block.name, "CH01_START");
    assert_eq!(block.invocation_count, 2);
    let invocations = script.block_invocations(block);
    assert_eq!(invocations.len(), 2);
    assert_eq!(invocations[0].address, block.start_offset as usize);
}

#[test]
fn fixed_and_short_parameters_do_not_overlap() {
    let script = parse(
        ScriptBuilder::new("S01A", "R", "T")
            .symbols(&["MAIN"])
            .block(
                0,
                vec![InstructionSpec::new(1, op::MSG)
                    .param(0x05, pair(0x300, 1))
                    .param(0x0A, word(1))],
            )
            .build(),
    );

    let params = &script.invocations()[0].parameters;
    assert_eq!(params[0].tag, 0x05);
    assert_eq!(params[0].payload.len(), 8);
    assert_eq!(params[1].tag, 0x0A);
    assert_eq!(params[1].payload.len(), 4);
    assert_eq!(params[1].offset, params[0].offset + params[0].payload.len() + 2);
}

#[test]
fn decompile_is_idempotent() -> Result<()> {
    let script = parse(chapter());
    let first = script.decompile(RenderMode::Semantic)?;
    let second = script.decompile(RenderMode::Semantic)?;
    assert_eq!(first, second);
    assert_eq!(script.decompile(RenderMode::Raw)?, script.decompile(RenderMode::Raw)?);
    Ok(())
}

#[test]
fn decompiled_chapter() -> Result<()> {
    let script = parse(chapter());
    let expected = "\
== CH01_START ==
EV_MODE(TRUE)
WAIT(frames lit 30)
== MAIN ==

SET<0>(var FLAG_TALKED, lit 1)

JUMP(12, if var FLAG_TALKED == lit 1)



MSG(0015 00 05, 0005 00 00 03 03 00 00 00 02)
== FLAG_TALKED ==

";
    assert_eq!(script.decompile(RenderMode::Semantic)?, expected);
    Ok(())
}

#[test]
fn jump_renders_target_line() -> Result<()> {
    let script = parse(chapter());
    let jump = &script.invocations()[3];
    let text = script.renderer(RenderMode::Semantic).render_invocation(jump)?;
    assert_eq!(text, "JUMP(12, if var FLAG_TALKED == lit 1)");
    Ok(())
}

#[test]
fn edits_keep_offsets_consistent() -> Result<()> {
    let mut script = parse(chapter());
    let config = PatchConfig::default();

    script.edit_dialogue(1, "Morning! You're late, Kyon.", &config)?;
    assert_consistent(&script);
    script.edit_dialogue(0, "Hi", &config)?;
    assert_consistent(&script);
    script.edit_dialogue(2, "……。", &config)?;
    assert_consistent(&script);
    script.edit_dialogue(1, "Late!", &config)?;
    assert_consistent(&script);
    Ok(())
}

#[test]
fn length_delta_propagates_to_later_lines() -> Result<()> {
    let mut script = parse(chapter());
    let before: Vec<usize> = script.dialogue().iter().map(|l| l.offset).collect();
    assert_eq!(before.len(), 3);

    let old = script.dialogue()[1].text.clone();
    let new = format!("{} Again.", old);
    let outcome = script.edit_dialogue(1, &new, &PatchConfig::default())?;
    assert_eq!(outcome.length_delta, 7);

    let after: Vec<usize> = script.dialogue().iter().map(|l| l.offset).collect();
    assert_eq!(after[0], before[0]);
    assert_eq!(after[1], before[1]);
    assert_eq!(after[2], before[2] + 7);
    assert_eq!(script.dialogue()[1].text, new);
    Ok(())
}

#[test]
fn over_cap_is_cut_to_exactly_the_cap() -> Result<()> {
    let mut script = parse(chapter());
    let long = "a".repeat(300);
    let outcome = script.edit_dialogue(2, &long, &PatchConfig::default())?;

    let t = outcome.truncation.expect("truncation reported");
    assert_eq!(t.full_len, 300);
    assert_eq!(t.cap, 256);

    let fresh = parse(script.to_bytes());
    assert_eq!(fresh.dialogue()[2].text, "a".repeat(256));
    assert_consistent(&script);
    Ok(())
}

#[test]
fn truncation_keeps_double_byte_characters_whole() -> Result<()> {
    let mut script = parse(chapter());
    let config = PatchConfig { dialogue_byte_cap: 5 };
    let outcome = script.edit_dialogue(0, "あいう", &config)?;

    assert!(outcome.truncated());
    assert_eq!(script.dialogue()[0].text, "あい");
    assert_consistent(&script);
    Ok(())
}

#[test]
fn jumps_keep_their_payload_across_edits() -> Result<()> {
    let mut script = parse(chapter());
    let target = script.invocations()[3].param(tags::JUMP_TARGET, 0).unwrap().payload.clone();

    script.edit_dialogue(0, "Hi", &PatchConfig::default())?;
    let jump = &script.invocations()[3];
    assert_eq!(jump.param(tags::JUMP_TARGET, 0).unwrap().payload, target);

    let text = script.renderer(RenderMode::Semantic).render_invocation(jump)?;
    assert_eq!(text, "JUMP(12, if var FLAG_TALKED == lit 1)");
    Ok(())
}

#[test]
fn jumps_resolve_after_an_edit() -> Result<()> {
    let mut script = parse(
        ScriptBuilder::new("S01A", "R", "T")
            .symbols(&["MAIN", "Hi.", "V01_KYN0001"])
            .block(
                0,
                vec![
                    InstructionSpec::new(2, op::JUMP).jump_to(0, 1),
                    InstructionSpec::new(3, op::NOP),
                ],
            )
            .build(),
    );
    let expected = "== MAIN ==\nJUMP(3)\nNOP()\n";
    assert_eq!(script.decompile(RenderMode::Semantic)?, expected);

    script.edit_dialogue(0, "Hello there.", &PatchConfig::default())?;
    assert_eq!(script.decompile(RenderMode::Semantic)?, expected);
    Ok(())
}

#[test]
fn import_applies_keys_in_any_order() -> Result<()> {
    let mut script = parse(chapter());
    let entries = vec![
        ("0002_NGT", "Yes."),
        ("0000_KYN", "Morning."),
        ("0001_HRH", "You're late!\nAgain!"),
    ];
    let outcomes = import_dialogue(&mut script, entries, &PatchConfig::default())?;

    assert_eq!(outcomes.iter().map(|o| o.index).collect::<Vec<_>>(), vec![2, 0, 1]);
    let texts: Vec<&str> = script.dialogue().iter().map(|l| l.text.as_str()).collect();
    assert_eq!(texts, vec!["Morning.", "You're late!\nAgain!", "Yes."]);
    assert_consistent(&script);
    Ok(())
}

#[test]
fn bad_import_key_stops_the_import() {
    let mut script = parse(chapter());
    let err = import_dialogue(&mut script, [("xx", "nope")], &PatchConfig::default()).unwrap_err();
    assert!(matches!(err, ScriptError::InvalidImportKey { .. }));
}

#[test]
fn instruction_past_the_next_block_is_an_overrun() {
    let bytes = ScriptBuilder::new("S01A", "R", "T")
        .symbols(&["MAIN", "SUB"])
        .block(0, vec![InstructionSpec::new(1, op::LOG).param(tags::BOOL, word(1))])
        .block(1, vec![InstructionSpec::new(2, op::NOP)])
        .build();
    let valid = parse(bytes.clone());
    let start = valid.blocks()[0].start_offset as usize;

    // SUB now starts 14 bytes into the 18-byte LOG instruction
    let mut bytes = bytes;
    write_u32(&mut bytes, valid.blocks()[1].address + 4, (start + 14) as u32).unwrap();

    let err = ScriptFile::parse(bytes, &test_catalog(), Encoding::ShiftJis).unwrap_err();
    match err {
        ScriptError::BlockOverrun { block, pos, end } => {
            assert_eq!(block, "MAIN");
            assert_eq!(pos, start + 18);
            assert_eq!(end, start + 14);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn unknown_tag_stops_the_parse() {
    let bytes = ScriptBuilder::new("S01A", "R", "T")
        .symbols(&["MAIN"])
        .block(0, vec![InstructionSpec::new(1, op::LOG).param(0x7F, word(0))])
        .build();
    let header_end = parse(
        ScriptBuilder::new("S01A", "R", "T")
            .symbols(&["MAIN"])
            .block(0, vec![])
            .build(),
    )
    .blocks()[0]
        .start_offset as usize;

    let err = ScriptFile::parse(bytes, &test_catalog(), Encoding::ShiftJis).unwrap_err();
    let payload = header_end + 12 + 2;
    assert!(
        matches!(err, ScriptError::UnknownParameterTag { tag: 0x7F, offset } if offset == payload),
        "{:?}",
        err
    );
}

#[test]
fn parse_game_script() -> Result<()> {
    let (Ok(script), Ok(catalog)) =
        (fs::read("testcase/script.bin"), fs::read("testcase/catalog.bin"))
    else {
        // Skip in CI if testcase isn't present.
        println!("skipping missing testcase");
        return Ok(());
    };

    let catalog = OpcodeCatalog::parse(&catalog)?;
    let Some(parsed) = ScriptFile::parse(script.clone(), &catalog, Encoding::ShiftJis)? else {
        println!("testcase is not a script file");
        return Ok(());
    };
    println!("parsed {}", parsed.describe());
    parsed.decompile(RenderMode::Raw)?;
    assert_eq!(parsed.into_bytes(), script);
    Ok(())
}
