//! Module-level integration tests: header validation, top-level block
//! accounting, the types and globals blocks, and name installation.

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use rimec::bitcode::codes::{self, block, decode_sign_rotated};
use rimec::bitcode::stream::EventStream;
use rimec::diagnostics::ErrorKind;
use rimec::ir::cfg::Cfg;
use rimec::ir::globals::{Initializer, VariableDecl};
use rimec::lower::{Lower, NullLower};
use rimec::{Flags, TranslationError, Translator};

/// Backend that records everything it is handed.
struct Recorder {
    cfgs: Mutex<Vec<Cfg>>,
    emitted_globals: Mutex<Vec<Vec<VariableDecl>>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cfgs: Mutex::new(Vec::new()),
            emitted_globals: Mutex::new(Vec::new()),
        })
    }
}

impl Lower for Recorder {
    fn lower(&self, cfg: Cfg) {
        self.cfgs.lock().push(cfg);
    }

    fn emit_globals(&self, variables: &[VariableDecl]) {
        self.emitted_globals.lock().push(variables.to_vec());
    }
}

fn permissive_translator(backend: Arc<dyn Lower>) -> Translator {
    Translator::new(Flags::permissive(), backend)
}

// ============================================================
// Entry point checks
// ============================================================

#[test]
fn test_empty_module_translates() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.record(codes::module::VERSION, &[1]);
    stream.exit_block();

    let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
    assert!(translator.translate_stream(&mut stream).is_ok());
    assert!(translator.diagnostics().is_empty());
}

#[test]
fn test_byte_roundtrip() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.record(codes::module::VERSION, &[1]);
    stream.exit_block();
    let bytes = stream.to_bytes();

    let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
    assert!(translator.translate(&bytes).is_ok());
}

#[test]
fn test_misaligned_stream_rejected() {
    let mut bytes = EventStream::new().to_bytes();
    bytes.push(0);

    let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
    assert!(matches!(
        translator.translate(&bytes),
        Err(TranslationError::MisalignedStream(_))
    ));
}

#[test]
fn test_bad_header_rejected() {
    let bytes = vec![0u8; 16];
    let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
    assert!(matches!(
        translator.translate(&bytes),
        Err(TranslationError::InvalidHeader)
    ));
}

#[test]
fn test_zero_top_level_blocks_is_error() {
    let mut stream = EventStream::new();
    let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
    assert!(matches!(
        translator.translate_stream(&mut stream),
        Err(TranslationError::TopLevelBlockCount(0))
    ));
}

#[test]
fn test_two_top_level_modules_is_error() {
    let mut stream = EventStream::new();
    for _ in 0..2 {
        stream.enter_block(block::MODULE);
        stream.record(codes::module::VERSION, &[1]);
        stream.exit_block();
    }

    let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
    assert!(matches!(
        translator.translate_stream(&mut stream),
        Err(TranslationError::TopLevelBlockCount(2))
    ));
}

#[test]
fn test_unknown_bitstream_version() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.record(codes::module::VERSION, &[7]);
    stream.exit_block();

    let mut translator = permissive_translator(Arc::new(NullLower));
    assert!(matches!(
        translator.translate_stream(&mut stream),
        Err(TranslationError::Invalid(1))
    ));
    assert!(translator.diagnostics()[0].message.contains("version"));
}

// ============================================================
// Block dispatch
// ============================================================

#[test]
fn test_unknown_block_skipped_with_one_diagnostic() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.record(codes::module::VERSION, &[1]);
    // An unknown nested block full of junk records.
    stream.enter_block(77);
    stream.record(1, &[2, 3]);
    stream.record(9, &[]);
    stream.exit_block();
    // Decoding resumes: the types block after it is still processed.
    stream.enter_block(block::TYPES);
    stream.record(codes::types::COUNT, &[1]);
    stream.record(codes::types::INTEGER, &[32]);
    stream.exit_block();
    stream.exit_block();

    let mut translator = permissive_translator(Arc::new(NullLower));
    assert!(matches!(
        translator.translate_stream(&mut stream),
        Err(TranslationError::Invalid(1))
    ));
    assert_eq!(translator.diagnostics()[0].kind, ErrorKind::Structural);
    assert_eq!(translator.context().num_types(), 1);
}

#[test]
fn test_strict_mode_stops_at_first_error() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.enter_block(77);
    stream.exit_block();
    stream.exit_block();

    let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
    assert!(matches!(
        translator.translate_stream(&mut stream),
        Err(TranslationError::Malformed(_))
    ));
    assert_eq!(translator.diagnostics().len(), 1);
}

// ============================================================
// Globals block
// ============================================================

#[test]
fn test_compound_initializer_roundtrip() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.record(codes::module::VERSION, &[1]);
    stream.enter_block(block::GLOBALS);
    stream.record(codes::globals::COUNT, &[1]);
    stream.record(codes::globals::VAR, &[3, 1]); // align 2**2, constant
    stream.record(codes::globals::COMPOUND, &[2]);
    stream.record(codes::globals::ZEROFILL, &[8]);
    stream.record(codes::globals::DATA, &[1, 2, 3, 4]);
    stream.exit_block();
    stream.exit_block();

    let recorder = Recorder::new();
    let mut translator = Translator::new(Flags::default(), Arc::clone(&recorder) as Arc<dyn Lower>);
    assert!(translator.translate_stream(&mut stream).is_ok());
    assert!(translator.diagnostics().is_empty());

    let variables = translator.context().variables();
    assert_eq!(variables.len(), 1);
    let var = &variables[0];
    assert_eq!(var.alignment, 4);
    assert!(var.constant);
    assert_eq!(
        var.initializers,
        vec![
            Initializer::Zerofill(8),
            Initializer::Data(vec![1, 2, 3, 4])
        ]
    );
    assert_eq!(var.byte_size(), 12);

    // emit_globals ran exactly once, after names were installed, and no
    // function bodies reached lowering.
    let emitted = recorder.emitted_globals.lock();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0][0].name.as_deref(), Some("Global0"));
    assert!(recorder.cfgs.lock().is_empty());
}

#[test]
fn test_initializer_count_mismatch_reported_once() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.enter_block(block::GLOBALS);
    stream.record(codes::globals::COUNT, &[1]);
    stream.record(codes::globals::VAR, &[0, 0]);
    stream.record(codes::globals::COMPOUND, &[3]);
    stream.record(codes::globals::ZEROFILL, &[4]);
    stream.record(codes::globals::ZEROFILL, &[4]);
    stream.exit_block();
    stream.exit_block();

    let mut translator = permissive_translator(Arc::new(NullLower));
    assert!(matches!(
        translator.translate_stream(&mut stream),
        Err(TranslationError::Invalid(1))
    ));
    // Self-corrected: the two initializers survive, and the mismatch is
    // reported exactly once.
    let diag = &translator.diagnostics()[0];
    assert!(diag.message.contains("expected 3 initializer"));
    assert_eq!(translator.context().variables()[0].initializers.len(), 2);
}

#[test]
fn test_reloc_initializer_records_target() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.enter_block(block::GLOBALS);
    stream.record(codes::globals::COUNT, &[2]);
    stream.record(codes::globals::VAR, &[0, 0]);
    stream.record(codes::globals::RELOC, &[1, 16]);
    stream.record(codes::globals::VAR, &[0, 0]);
    stream.record(codes::globals::ZEROFILL, &[4]);
    stream.exit_block();
    stream.exit_block();

    let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
    assert!(translator.translate_stream(&mut stream).is_ok());
    assert_eq!(
        translator.context().variables()[0].initializers,
        vec![Initializer::Reloc {
            global_id: 1,
            offset: 16
        }]
    );
}

// ============================================================
// Names
// ============================================================

#[test]
fn test_symtab_and_generated_names() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.record(codes::module::VERSION, &[1]);
    stream.enter_block(block::TYPES);
    stream.record(codes::types::COUNT, &[2]);
    stream.record(codes::types::VOID, &[]);
    stream.record(codes::types::FUNCTION, &[0, 0]); // void ()
    stream.exit_block();
    // Two prototype declarations sharing the signature.
    stream.record(codes::module::FUNCTION, &[1, 0, 1, 0]);
    stream.record(codes::module::FUNCTION, &[1, 0, 1, 0]);
    stream.enter_block(block::GLOBALS);
    stream.record(codes::globals::COUNT, &[1]);
    stream.record(codes::globals::VAR, &[0, 0]);
    stream.record(codes::globals::ZEROFILL, &[4]);
    stream.exit_block();
    stream.enter_block(block::VALUE_SYMTAB);
    stream.record(
        codes::symtab::ENTRY,
        &[0, 'm' as u64, 'a' as u64, 'i' as u64, 'n' as u64],
    );
    stream.exit_block();
    stream.exit_block();

    let mut translator = Translator::new(Flags::default(), Arc::new(NullLower));
    assert!(translator.translate_stream(&mut stream).is_ok());

    let ctx = translator.context();
    assert_eq!(ctx.global_name(0), Some("main"));
    // Unnamed declarations get generated names with per-kind counters.
    assert_eq!(ctx.global_name(1), Some("Function0"));
    assert_eq!(ctx.global_name(2), Some("Global0"));
}

#[test]
fn test_bad_linkage_reported() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.enter_block(block::TYPES);
    stream.record(codes::types::COUNT, &[2]);
    stream.record(codes::types::VOID, &[]);
    stream.record(codes::types::FUNCTION, &[0, 0]);
    stream.exit_block();
    stream.record(codes::module::FUNCTION, &[1, 0, 1, 5]);
    stream.exit_block();

    let mut translator = permissive_translator(Arc::new(NullLower));
    assert!(translator.translate_stream(&mut stream).is_err());
    assert!(translator.diagnostics()[0].message.contains("linkage"));
    assert_eq!(translator.context().num_function_ids(), 0);
}

#[test]
fn test_more_function_blocks_than_declared_is_fatal() {
    let mut stream = EventStream::new();
    stream.enter_block(block::MODULE);
    stream.enter_block(block::FUNCTION);
    stream.exit_block();
    stream.exit_block();

    // Fatal even in recovery mode.
    let mut translator = permissive_translator(Arc::new(NullLower));
    assert!(matches!(
        translator.translate_stream(&mut stream),
        Err(TranslationError::Malformed(_))
    ));
}

// ============================================================
// Shared decodings
// ============================================================

#[test]
fn test_sign_rotation_examples() {
    assert_eq!(decode_sign_rotated(1), -1);
    assert_eq!(decode_sign_rotated(6), 3);
    assert_eq!(decode_sign_rotated(7), -4);
}

proptest! {
    #[test]
    fn prop_sign_rotation_roundtrip(value: i64) {
        // Encoding folds the sign into the low bit.
        let encoded = ((value << 1) ^ (value >> 63)) as u64;
        prop_assert_eq!(decode_sign_rotated(encoded), value);
    }

    #[test]
    fn prop_sign_rotation_parity(raw: u64) {
        let decoded = decode_sign_rotated(raw);
        if raw % 2 == 0 {
            prop_assert!(decoded >= 0);
        } else {
            prop_assert!(decoded < 0);
        }
    }
}
