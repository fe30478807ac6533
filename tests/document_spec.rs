use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use encoding_rs::WINDOWS_1252;

use ecadlib::ecad::codec::block::BlockWriter;
use ecadlib::ecad::codec::compressed::write_compressed_entry;
use ecadlib::ecad::format::keys::SectionKeys;
use ecadlib::ecad::format::ownership::{assign_emission_indices, build_ownership_tree};
use ecadlib::ecad::format::records::write_parameter_block;
use ecadlib::ecad::types::models::{NO_OWNER, OWNER_INDEX_KEY};
use ecadlib::{
    CompressedEntry, Container, Context, DocumentKind, DocumentReader, DocumentWriter, EcadError,
    Library, MemoryContainer, ParameterCollection, ReadOptions, Record, RecordPayload, Section,
    WriteOptions,
};

fn param_record(tag: i32, owner: i32) -> Record {
    let mut params = ParameterCollection::new();
    params.set_int("RECORD", 1);
    params.set_int("TAG", tag);
    if owner != NO_OWNER {
        params.set_int(OWNER_INDEX_KEY, owner);
    }
    Record::from_parameters(params)
}

fn tag_of(record: &Record) -> i32 {
    record
        .parameters()
        .map(|p| p.get_int_or("TAG", -1))
        .unwrap_or(-1)
}

fn built_section(name: &str, mut records: Vec<Record>) -> Section {
    let mut ctx = Context::new();
    let roots = build_ownership_tree(&mut records, &mut ctx);
    assert!(
        ctx.warnings().is_empty(),
        "fixture section must resolve cleanly: {:?}",
        ctx.warnings()
    );
    Section {
        name: name.to_owned(),
        records,
        roots,
    }
}

fn write_params_stream(container: &mut MemoryContainer, path: &str, params: &ParameterCollection) {
    let mut writer = BlockWriter::new();
    write_parameter_block(&mut writer, params, WINDOWS_1252)
        .unwrap_or_else(|e| panic!("serialize params for {path}: {e}"));
    container
        .write_stream(path, &writer.into_inner())
        .unwrap_or_else(|e| panic!("write stream {path}: {e}"));
}

#[test]
fn ownership_links_follow_owner_indices() {
    let mut records = vec![
        param_record(0, NO_OWNER),
        param_record(1, 0),
        param_record(2, 0),
        param_record(3, 1),
    ];
    let mut ctx = Context::new();
    let roots = build_ownership_tree(&mut records, &mut ctx);

    assert_eq!(roots, vec![0]);
    assert_eq!(records[0].children, vec![1, 2]);
    assert_eq!(records[1].children, vec![3]);
    assert_eq!(records[1].parent, Some(0));
    assert_eq!(records[3].parent, Some(1));
    assert!(ctx.warnings().is_empty());
}

#[test]
fn unresolvable_owners_become_roots_with_warnings() {
    let mut records = vec![
        param_record(0, NO_OWNER),
        param_record(1, 1), // self reference
        param_record(2, 5), // forward reference
    ];
    let mut ctx = Context::new();
    let roots = build_ownership_tree(&mut records, &mut ctx);

    assert_eq!(roots, vec![0, 1, 2], "bad owners demote to roots");
    assert_eq!(ctx.warnings().len(), 2);
    for warning in ctx.warnings() {
        assert!(
            warning.message.contains("owner"),
            "warning should name the owner problem: {warning}"
        );
    }
}

#[test]
fn emission_orders_parents_before_children() {
    let mut records = vec![
        param_record(0, NO_OWNER),
        param_record(1, 0),
        param_record(2, 1),
        param_record(3, 0),
    ];
    let mut ctx = Context::new();
    let roots = build_ownership_tree(&mut records, &mut ctx);
    let emissions = assign_emission_indices(&records, &roots, &mut ctx);

    assert_eq!(emissions.len(), records.len());
    for (i, emission) in emissions.iter().enumerate() {
        assert_eq!(emission.position, i, "positions must be sequential");
        assert!(
            emission.owner_index < emission.position as i32,
            "owner must be emitted before record {i}"
        );
    }
    let order: Vec<usize> = emissions.iter().map(|e| e.record).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[test]
fn emission_renumbers_a_reordered_tree() {
    let mut records = vec![
        param_record(0, NO_OWNER),
        param_record(1, 0),
        param_record(2, 0),
    ];
    let mut ctx = Context::new();
    let roots = build_ownership_tree(&mut records, &mut ctx);
    // Swap the sibling order in memory.
    records[0].children = vec![2, 1];

    let emissions = assign_emission_indices(&records, &roots, &mut ctx);
    let order: Vec<i32> = emissions
        .iter()
        .map(|e| tag_of(&records[e.record]))
        .collect();
    assert_eq!(order, vec![0, 2, 1]);

    // Replay the emissions as a fresh stream, the way the writer would.
    let mut replayed: Vec<Record> = emissions
        .iter()
        .map(|e| {
            let mut params = records[e.record]
                .parameters()
                .expect("parameter record")
                .clone();
            if e.owner_index == NO_OWNER {
                params.remove(OWNER_INDEX_KEY);
            } else {
                params.set_int(OWNER_INDEX_KEY, e.owner_index);
            }
            Record::from_parameters(params)
        })
        .collect();
    let new_roots = build_ownership_tree(&mut replayed, &mut ctx);

    assert_eq!(new_roots, vec![0]);
    assert_eq!(replayed[0].children, vec![1, 2]);
    assert_eq!(replayed[1].parent, Some(0));
    assert_eq!(replayed[2].parent, Some(0));
    assert_eq!(tag_of(&replayed[1]), 2, "swapped child comes first now");
    assert_eq!(tag_of(&replayed[2]), 1);
    assert!(ctx.warnings().is_empty());
}

#[test]
fn cyclic_children_edits_cannot_loop_the_emitter() {
    let mut records = vec![param_record(0, NO_OWNER), param_record(1, 0)];
    let mut ctx = Context::new();
    let roots = build_ownership_tree(&mut records, &mut ctx);
    // Point the child back at its own parent.
    records[1].children = vec![0];

    let emissions = assign_emission_indices(&records, &roots, &mut ctx);

    let order: Vec<usize> = emissions.iter().map(|e| e.record).collect();
    assert_eq!(order, vec![0, 1], "each record is emitted exactly once");
    assert_eq!(ctx.warnings().len(), 1);
    assert!(
        ctx.warnings()[0].message.contains("more than one owner"),
        "the dropped link must surface as a warning: {:?}",
        ctx.warnings()
    );
}

#[test]
fn dangling_children_edits_are_dropped_with_a_warning() {
    let mut records = vec![param_record(0, NO_OWNER)];
    let mut ctx = Context::new();
    let roots = build_ownership_tree(&mut records, &mut ctx);
    records[0].children = vec![7];

    let emissions = assign_emission_indices(&records, &roots, &mut ctx);

    assert_eq!(emissions.len(), 1, "only the real record is emitted");
    assert_eq!(ctx.warnings().len(), 1);
    assert!(
        ctx.warnings()[0].message.contains("missing record 7"),
        "the dangling link must surface as a warning: {:?}",
        ctx.warnings()
    );
}

#[test]
fn record_without_owner_key_is_a_root() {
    let record = Record::from_parameters(ParameterCollection::parse(b"|RECORD=1", WINDOWS_1252));
    assert_eq!(record.owner_index, NO_OWNER);
}

#[test]
fn library_round_trip_preserves_model() {
    let mut header = ParameterCollection::new();
    header.set("CUSTOM", "kept");

    let library = Library {
        kind: Some(DocumentKind::FootprintLibrary),
        header,
        sections: vec![built_section(
            "RES0402",
            vec![
                param_record(0, NO_OWNER),
                param_record(1, 0),
                param_record(2, 1),
                Record::from_binary(0x05, vec![0xde, 0xad, 0xbe, 0xef]),
            ],
        )],
        storage: vec![CompressedEntry {
            id: "icon.bmp".to_owned(),
            data: b"BM fake bitmap bytes, repeated for compressibility".repeat(3),
        }],
        wide_strings: vec!["\u{3a9} resistor".to_owned(), "\u{96fb}\u{963b}".to_owned()],
    };

    let mut container = MemoryContainer::new();
    let mut writer = DocumentWriter::new(&mut container);
    writer.write(&library).expect("write library");
    assert!(
        writer.warnings().is_empty(),
        "clean write: {:?}",
        writer.warnings()
    );

    let mut reader = DocumentReader::new(&container);
    let round = reader.read().expect("read library back");
    assert!(
        reader.warnings().is_empty(),
        "clean read: {:?}",
        reader.warnings()
    );

    assert_eq!(round.kind, Some(DocumentKind::FootprintLibrary));
    assert_eq!(round.header.get("CUSTOM"), Some("kept"));
    assert_eq!(
        round.header.get("HEADER"),
        Some(DocumentKind::FootprintLibrary.header())
    );

    let section = round.section("RES0402").expect("section survives");
    assert_eq!(section.records.len(), 4);
    assert_eq!(section.roots, vec![0, 3]);
    assert_eq!(section.records[0].children, vec![1]);
    assert_eq!(section.records[1].children, vec![2]);
    assert_eq!(section.records[1].parent, Some(0));
    for (i, expected_tag) in [(0usize, 0), (1, 1), (2, 2)] {
        assert_eq!(tag_of(&section.records[i]), expected_tag);
    }
    match &section.records[3].payload {
        RecordPayload::Binary { flags, bytes } => {
            assert_eq!(*flags, 0x05);
            assert_eq!(bytes, &[0xde, 0xad, 0xbe, 0xef]);
        }
        other => panic!("expected verbatim binary record, got {other:?}"),
    }

    assert_eq!(round.storage, library.storage);
    assert_eq!(round.wide_strings, library.wide_strings);
}

#[test]
fn rewriting_a_read_library_is_byte_identical() {
    let library = Library {
        kind: Some(DocumentKind::SchematicLibrary),
        header: ParameterCollection::new(),
        sections: vec![built_section(
            "NAND Gate",
            vec![
                param_record(0, NO_OWNER),
                param_record(1, 0),
                param_record(2, 0),
            ],
        )],
        storage: vec![CompressedEntry {
            id: "preview".to_owned(),
            data: vec![0x42; 200],
        }],
        wide_strings: vec!["note".to_owned()],
    };

    let mut first = MemoryContainer::new();
    DocumentWriter::new(&mut first)
        .write(&library)
        .expect("first write");

    let round = DocumentReader::new(&first).read().expect("read back");

    let mut second = MemoryContainer::new();
    DocumentWriter::new(&mut second)
        .write(&round)
        .expect("second write");

    assert_eq!(first.stream_names(), second.stream_names());
    for name in first.stream_names() {
        assert_eq!(
            first.stream(&name),
            second.stream(&name),
            "stream {name} must not drift across a read/write cycle"
        );
    }
}

#[test]
fn unknown_document_header_reads_with_warning() {
    let mut container = MemoryContainer::new();
    let mut header = ParameterCollection::new();
    header.set("HEADER", "Mystery Format 9000");
    header.set_int("SECTIONCOUNT", 0);
    write_params_stream(&mut container, "FileHeader", &header);

    let mut reader = DocumentReader::new(&container);
    let library = reader.read().expect("unknown kind is not fatal");

    assert_eq!(library.kind, None);
    assert_eq!(library.header.get("HEADER"), Some("Mystery Format 9000"));
    assert!(
        reader
            .warnings()
            .iter()
            .any(|w| w.message.contains("document header")),
        "expected a document header warning, got {:?}",
        reader.warnings()
    );
}

#[test]
fn corrupt_storage_header_aborts_but_keeps_warnings() {
    let mut container = MemoryContainer::new();
    let mut header = ParameterCollection::new();
    header.set("HEADER", "Mystery Format 9000");
    header.set_int("SECTIONCOUNT", 0);
    write_params_stream(&mut container, "FileHeader", &header);

    let mut storage_header = ParameterCollection::new();
    storage_header.set("HEADER", "Wrong");
    write_params_stream(&mut container, "Storage/Data", &storage_header);

    let mut reader = DocumentReader::new(&container);
    let err = reader.read().expect_err("bad storage header is fatal");
    match err {
        EcadError::AssertionFailed { path, message } => {
            assert_eq!(path, "Storage");
            assert!(
                message.contains("storage header"),
                "message should name the failed check: {message}"
            );
        }
        other => panic!("expected AssertionFailed, got {other:?}"),
    }
    assert!(
        !reader.warnings().is_empty(),
        "warnings recorded before the abort must survive"
    );
}

#[test]
fn storage_weight_mismatch_is_a_warning() {
    let mut container = MemoryContainer::new();
    let mut header = ParameterCollection::new();
    header.set("HEADER", DocumentKind::PcbDocument.header());
    header.set_int("SECTIONCOUNT", 0);
    write_params_stream(&mut container, "FileHeader", &header);

    let mut storage_header = ParameterCollection::new();
    storage_header.set("HEADER", "Icon storage");
    storage_header.set_int("WEIGHT", 5);
    let mut writer = BlockWriter::new();
    write_parameter_block(&mut writer, &storage_header, WINDOWS_1252).expect("storage header");
    write_compressed_entry(&mut writer, "only", b"entry data", WINDOWS_1252).expect("entry");
    container
        .write_stream("Storage/Data", &writer.into_inner())
        .expect("storage stream");

    let mut reader = DocumentReader::new(&container);
    let library = reader.read().expect("weight mismatch is not fatal");

    assert_eq!(library.storage.len(), 1);
    assert_eq!(library.storage[0].id, "only");
    assert!(
        reader
            .warnings()
            .iter()
            .any(|w| w.message.contains("WEIGHT")),
        "expected a WEIGHT warning, got {:?}",
        reader.warnings()
    );
}

#[test]
fn preset_cancellation_stops_before_any_work() {
    let cancel = Arc::new(AtomicBool::new(true));
    let container = MemoryContainer::new();
    let options = ReadOptions {
        cancel: Some(cancel.clone()),
        ..ReadOptions::default()
    };
    let err = DocumentReader::with_options(&container, options)
        .read()
        .expect_err("pre-set flag must cancel the read");
    assert!(matches!(err, EcadError::Cancelled), "got {err:?}");

    let mut container = MemoryContainer::new();
    let options = WriteOptions {
        cancel: Some(cancel),
        ..WriteOptions::default()
    };
    let err = DocumentWriter::with_options(&mut container, options)
        .write(&Library::new(DocumentKind::PcbDocument))
        .expect_err("pre-set flag must cancel the write");
    assert!(matches!(err, EcadError::Cancelled), "got {err:?}");
    assert!(
        container.stream_names().is_empty(),
        "cancelled write must not touch the container"
    );
}

#[test]
fn awkward_section_names_get_storage_aliases() {
    let long_name = "Very Long Component Name That Exceeds The Limit";
    let slashed_name = "RES/0402";
    let library = Library {
        kind: Some(DocumentKind::FootprintLibrary),
        header: ParameterCollection::new(),
        sections: vec![
            built_section(long_name, vec![param_record(0, NO_OWNER)]),
            built_section(slashed_name, vec![param_record(1, NO_OWNER)]),
        ],
        storage: Vec::new(),
        wide_strings: Vec::new(),
    };

    let mut container = MemoryContainer::new();
    DocumentWriter::new(&mut container)
        .write(&library)
        .expect("write aliased library");

    assert!(container.has_stream("SectionKeys"));
    assert!(
        container.has_stream("Very Long Component Name~1/Data"),
        "long name must be stored under its generated key: {:?}",
        container.stream_names()
    );
    assert!(
        container.has_stream("RES0402~1/Data"),
        "slash must be stripped from the generated key: {:?}",
        container.stream_names()
    );

    let round = DocumentReader::new(&container)
        .read()
        .expect("read aliased library");
    assert!(round.section(long_name).is_some(), "long name resolves back");
    assert!(round.section(slashed_name).is_some(), "slashed name resolves back");
}

#[test]
fn sections_named_like_bookkeeping_streams_get_aliases() {
    // Bookkeeping names are displaced whatever their case.
    let mut keys = SectionKeys::new();
    assert_eq!(keys.assign("storage"), "storage~1");
    assert_eq!(keys.assign("WideStrings"), "WideStrings~1");

    let library = Library {
        kind: Some(DocumentKind::FootprintLibrary),
        header: ParameterCollection::new(),
        sections: vec![built_section("Storage", vec![param_record(7, NO_OWNER)])],
        storage: vec![CompressedEntry {
            id: "icon.bmp".to_owned(),
            data: b"real icon bytes".to_vec(),
        }],
        wide_strings: Vec::new(),
    };

    let mut container = MemoryContainer::new();
    let mut writer = DocumentWriter::new(&mut container);
    writer.write(&library).expect("write library");
    assert!(writer.warnings().is_empty(), "{:?}", writer.warnings());
    assert!(
        container.has_stream("Storage~1/Data"),
        "the section must step aside for the storage stream: {:?}",
        container.stream_names()
    );

    let round = DocumentReader::new(&container).read().expect("read back");
    let section = round.section("Storage").expect("section keeps its name");
    assert_eq!(tag_of(&section.records[0]), 7);
    assert_eq!(round.storage, library.storage, "icon storage is untouched");
}

#[test]
fn sections_are_enumerated_when_the_directory_is_absent() {
    let mut container = MemoryContainer::new();
    let mut header = ParameterCollection::new();
    header.set("HEADER", DocumentKind::SchematicDocument.header());
    write_params_stream(&mut container, "FileHeader", &header);

    let mut record = ParameterCollection::new();
    record.set_int("RECORD", 1);
    write_params_stream(&mut container, "BBB/Data", &record);
    write_params_stream(&mut container, "AAA/Data", &record);
    // A stray stream without a Data child is not a section.
    container
        .write_stream("Notes", b"free text")
        .expect("stray stream");

    let mut reader = DocumentReader::new(&container);
    let library = reader.read().expect("fallback enumeration");

    let names: Vec<&str> = library.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["AAA", "BBB"], "children list in sorted order");
    assert_eq!(library.sections[0].records.len(), 1);
    assert!(library.storage.is_empty());
    assert!(library.wide_strings.is_empty());
    assert!(reader.warnings().is_empty());
}

#[test]
fn broken_directory_entries_warn_and_skip() {
    let mut container = MemoryContainer::new();
    let mut header = ParameterCollection::new();
    header.set("HEADER", DocumentKind::SchematicLibrary.header());
    header.set_int("SECTIONCOUNT", 3);
    header.set("SECTIONREF0", "GOOD");
    header.set("SECTIONREF1", "GHOST");
    // SECTIONREF2 is deliberately absent.
    write_params_stream(&mut container, "FileHeader", &header);

    let mut record = ParameterCollection::new();
    record.set_int("RECORD", 1);
    write_params_stream(&mut container, "GOOD/Data", &record);

    let mut reader = DocumentReader::new(&container);
    let library = reader.read().expect("broken directory is not fatal");

    let names: Vec<&str> = library.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["GOOD"]);
    assert_eq!(reader.warnings().len(), 2);
    assert!(reader.warnings()[0].message.contains("SECTIONREF2"));
    assert!(reader.warnings()[1].message.contains("GHOST"));
}

#[test]
fn an_inflated_key_count_reads_only_real_pairs() {
    let mut table = ParameterCollection::new();
    table.set_int("KEYCOUNT", i32::MAX);
    table.set("LIBREF0", "Dual Op-Amp, Gull Wing, Rev B");
    table.set("SECTIONKEY0", "Dual Op-Amp, Gull Wing, ~1");

    let keys = SectionKeys::from_parameters(&table);

    assert_eq!(keys.len(), 1);
    assert_eq!(
        keys.key_for_ref("Dual Op-Amp, Gull Wing, Rev B"),
        "Dual Op-Amp, Gull Wing, ~1"
    );
}

#[test]
fn an_inflated_wide_string_count_is_trimmed_to_the_table() {
    let mut container = MemoryContainer::new();
    let mut header = ParameterCollection::new();
    header.set("HEADER", DocumentKind::PcbDocument.header());
    header.set_int("SECTIONCOUNT", 0);
    write_params_stream(&mut container, "FileHeader", &header);

    let mut wide = ParameterCollection::new();
    wide.set_int("COUNT", i32::MAX);
    wide.set_int_list("ENCODEDTEXT0", &[66, 50, 55]);
    write_params_stream(&mut container, "WideStrings/Data", &wide);

    let mut reader = DocumentReader::new(&container);
    let library = reader.read().expect("an inflated count is not fatal");

    assert_eq!(
        library.wide_strings.len(),
        2,
        "the scan stops where the table does"
    );
    assert_eq!(library.wide_strings[0], "B27");
    assert_eq!(library.wide_strings[1], "");
    assert!(
        reader
            .warnings()
            .iter()
            .any(|w| w.message.contains("ENCODEDTEXT1")),
        "the missing tail is reported: {:?}",
        reader.warnings()
    );
}

#[test]
fn unreachable_records_are_dropped_with_a_warning() {
    // A hand-built section whose roots list misses one record.
    let section = Section {
        name: "ORPHANS".to_owned(),
        records: vec![param_record(0, NO_OWNER), param_record(1, NO_OWNER)],
        roots: vec![0],
    };
    let library = Library {
        kind: Some(DocumentKind::PcbDocument),
        header: ParameterCollection::new(),
        sections: vec![section],
        storage: Vec::new(),
        wide_strings: Vec::new(),
    };

    let mut container = MemoryContainer::new();
    let mut writer = DocumentWriter::new(&mut container);
    writer.write(&library).expect("write still succeeds");
    assert!(
        writer
            .warnings()
            .iter()
            .any(|w| w.message.contains("unreachable")),
        "expected an unreachable-records warning, got {:?}",
        writer.warnings()
    );

    let round = DocumentReader::new(&container).read().expect("read back");
    assert_eq!(
        round.section("ORPHANS").expect("section present").records.len(),
        1,
        "only the reachable record is written"
    );
}

#[test]
fn reused_instances_report_only_the_latest_pass() {
    let mut container = MemoryContainer::new();
    let mut header = ParameterCollection::new();
    header.set("HEADER", "Mystery Format 9000");
    header.set_int("SECTIONCOUNT", 0);
    write_params_stream(&mut container, "FileHeader", &header);

    let mut reader = DocumentReader::new(&container);
    reader.read().expect("first read");
    reader.read().expect("second read");
    assert_eq!(
        reader.warnings().len(),
        1,
        "warnings from the first read must not carry over: {:?}",
        reader.warnings()
    );

    let library = Library {
        kind: Some(DocumentKind::PcbDocument),
        header: ParameterCollection::new(),
        sections: vec![Section {
            name: "ORPHANS".to_owned(),
            records: vec![param_record(0, NO_OWNER), param_record(1, NO_OWNER)],
            roots: vec![0],
        }],
        storage: Vec::new(),
        wide_strings: Vec::new(),
    };
    let mut target = MemoryContainer::new();
    let mut writer = DocumentWriter::new(&mut target);
    writer.write(&library).expect("first write");
    writer.write(&library).expect("second write");
    assert_eq!(
        writer.warnings().len(),
        1,
        "warnings from the first write must not carry over: {:?}",
        writer.warnings()
    );
}
