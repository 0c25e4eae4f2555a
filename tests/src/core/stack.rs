use crate::{GCC_HEAP, LIBFIRM, init_tracing};
use asmrand_core::{
    AssemblyFile, Dialect, Line, PaddingReport, STACK_ALIGNMENT, Section, SkipReason,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn section(dialect: Dialect, text: &[&str]) -> Section {
    let lines = text
        .iter()
        .enumerate()
        .map(|(number, content)| Line::new(*content, number))
        .collect();
    Section::from_lines(lines, dialect)
}

fn contents(section: &Section) -> Vec<&str> {
    section.lines().iter().map(Line::content).collect()
}

fn pad(section: &mut Section, amount: u64) -> PaddingReport {
    section.as_function_mut().unwrap().pad_stack(amount)
}

#[test]
fn gcc_functions_are_padded_and_data_objects_skipped() {
    init_tracing();
    let mut asm = AssemblyFile::parse(GCC_HEAP).unwrap();
    let mut rng = StdRng::seed_from_u64(0);

    let report = asm.randomize_stack(48..49, &mut rng);

    assert_eq!(report.padded, ["fill", "main", "helper"]);
    assert_eq!(
        report.skipped,
        [
            SkipReason::Truncated {
                function: "counter".into()
            },
            SkipReason::Truncated {
                function: "buffer".into()
            },
        ]
    );
    assert!(!report.is_complete());

    let fill = contents(&asm.sections()[5]);
    let push = fill.iter().position(|l| *l == "\tpushq\t%rbp").unwrap();
    assert_eq!(fill[push + 1], "\tsubq $48, %rsp");
    let ret = fill.iter().position(|l| *l == "\tret").unwrap();
    assert_eq!(
        fill[ret - 4..ret],
        ["\tmovq %rbp, %rsp", "\taddq $48, %rsp", "\tpopq %rbp", "\t.cfi_def_cfa 7, 8"]
    );
    assert!(!fill.contains(&"\tleave"));

    let main = contents(&asm.sections()[6]);
    let pop = main.iter().position(|l| *l == "\tpopq\t%rbp").unwrap();
    assert_eq!(main[pop - 1], "\taddq $48, %rsp");
}

#[test]
fn libfirm_functions_are_padded() {
    let mut asm = AssemblyFile::parse(LIBFIRM).unwrap();
    let data_before = asm.sections()[0].clone();
    let mut rng = StdRng::seed_from_u64(0);

    let report = asm.randomize_stack(16..17, &mut rng);

    assert_eq!(report.padded, ["square", "main"]);
    assert_eq!(
        report.skipped,
        [
            SkipReason::MissingPrologue {
                function: "table".into()
            },
            SkipReason::MissingPrologue {
                function: "first".into()
            },
        ]
    );
    assert_eq!(asm.sections()[0], data_before);

    let main = contents(&asm.sections()[3]);
    let ret = main.iter().position(|l| *l == "\tret").unwrap();
    assert_eq!(
        main[ret - 3..=ret],
        ["\tmovq %rbp, %rsp", "\taddq $16, %rsp", "\tpopq %rbp", "\tret"]
    );
}

#[test]
fn missing_prologue_leaves_function_untouched() {
    let mut section = section(
        Dialect::Gcc,
        &[
            "f:",
            "\t.cfi_startproc",
            "\tmovl\t$1, %eax",
            "\tret",
            "\t.cfi_endproc",
        ],
    );
    let before = section.clone();

    let report = pad(&mut section, 32);

    assert!(report.padded.is_empty());
    assert_eq!(
        report.skipped,
        [SkipReason::MissingPrologue {
            function: "f".into()
        }]
    );
    assert_eq!(section, before);
}

#[test]
fn unmatched_return_rolls_back_the_whole_function() {
    let mut section = section(
        Dialect::Gcc,
        &[
            "g:",
            "\t.cfi_startproc",
            "\tpushq\t%rbp",
            "\tmovq\t%rsp, %rbp",
            "\tjne\t.L1",
            "\tleave",
            "\tret",
            ".L1:",
            "\tret",
            "\t.cfi_endproc",
        ],
    );
    let before = section.clone();

    let report = pad(&mut section, 32);

    assert!(report.padded.is_empty());
    assert!(matches!(
        report.skipped.as_slice(),
        [SkipReason::MissingEpilogue { function, .. }] if function == "g"
    ));
    assert_eq!(section, before);
}

#[test]
fn failed_function_does_not_affect_its_neighbour() {
    let mut section = section(
        Dialect::Gcc,
        &[
            "ok:",
            "\t.cfi_startproc",
            "\tpushq\t%rbp",
            "\tpopq\t%rbp",
            "\tret",
            "\t.cfi_endproc",
            "bad:",
            "\t.cfi_startproc",
            "\txorl\t%eax, %eax",
            "\tret",
            "\t.cfi_endproc",
        ],
    );

    let report = pad(&mut section, 16);

    assert_eq!(report.padded, ["ok"]);
    assert_eq!(
        report.skipped,
        [SkipReason::MissingPrologue {
            function: "bad".into()
        }]
    );
    assert_eq!(
        contents(&section),
        [
            "ok:",
            "\t.cfi_startproc",
            "\tpushq\t%rbp",
            "\tsubq $16, %rsp",
            "\taddq $16, %rsp",
            "\tpopq\t%rbp",
            "\tret",
            "\t.cfi_endproc",
            "bad:",
            "\t.cfi_startproc",
            "\txorl\t%eax, %eax",
            "\tret",
            "\t.cfi_endproc",
        ]
    );
}

#[test]
fn marker_without_label_is_reported() {
    let mut section = section(Dialect::Libfirm, &["# -- Begin  anon", "\tret"]);
    let before = section.clone();

    let report = pad(&mut section, 8);

    assert_eq!(report.skipped, [SkipReason::MissingLabel { line: 0 }]);
    assert_eq!(section, before);
}

#[test]
fn empty_padding_range_skips_stack_randomization() {
    let mut asm = AssemblyFile::parse(GCC_HEAP).unwrap();
    let before = asm.render();
    let mut rng = StdRng::seed_from_u64(0);

    let report = asm.randomize_stack(0..0, &mut rng);

    assert_eq!(report, PaddingReport::default());
    assert_eq!(asm.render(), before);
}

#[test]
fn frame_pop_before_tail_call_rolls_back() {
    let mut section = section(
        Dialect::Gcc,
        &[
            "f:",
            "\t.cfi_startproc",
            "\tpushq\t%rbp",
            "\tmovq\t%rsp, %rbp",
            "\tcall\tg",
            "\tpopq\t%rbp",
            "\tjmp\th",
            "\t.cfi_endproc",
        ],
    );
    let before = section.clone();

    let report = pad(&mut section, 32);

    assert!(report.padded.is_empty());
    assert_eq!(
        report.skipped,
        [SkipReason::UnpatchedEpilogue {
            function: "f".into(),
            pop_line: 5,
        }]
    );
    assert_eq!(section, before);
}

#[test]
fn rep_ret_is_patched() {
    let mut section = section(
        Dialect::Gcc,
        &[
            "k:",
            "\t.cfi_startproc",
            "\tpushq\t%rbp",
            "\tmovq\t%rsp, %rbp",
            "\tpopq\t%rbp",
            "\trep ret",
            "\t.cfi_endproc",
        ],
    );

    let report = pad(&mut section, 32);

    assert_eq!(report.padded, ["k"]);
    let lines = contents(&section);
    let subs = lines.iter().filter(|l| **l == "\tsubq $32, %rsp").count();
    let adds = lines.iter().filter(|l| **l == "\taddq $32, %rsp").count();
    assert_eq!((subs, adds), (1, 1));
    assert_eq!(lines[5..], ["\taddq $32, %rsp", "\tpopq\t%rbp", "\trep ret", "\t.cfi_endproc"]);
}

#[test]
fn return_without_any_patch_is_not_reported_padded() {
    let mut section = section(
        Dialect::Gcc,
        &[
            "f:",
            "\t.cfi_startproc",
            "\tpushq\t%rbp",
            "\tpopq\t%rbp",
            "\tpopq\t%rbp",
            "\tret",
            "\t.cfi_endproc",
        ],
    );
    let before = section.clone();

    let report = pad(&mut section, 16);

    assert!(matches!(
        report.skipped.as_slice(),
        [SkipReason::UnpatchedEpilogue { function, pop_line: 3 }] if function == "f"
    ));
    assert_eq!(section, before);
}

#[test]
fn padding_keeps_stack_alignment() {
    let original = AssemblyFile::parse(GCC_HEAP).unwrap();

    for seed in 0..32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut asm = original.clone();
        asm.randomize_stack(0..1000, &mut rng);

        let amounts: Vec<u64> = asm
            .lines()
            .filter_map(|line| {
                let content = line.content();
                content
                    .strip_prefix("\tsubq $")
                    .or_else(|| content.strip_prefix("\taddq $"))
                    .and_then(|rest| rest.strip_suffix(", %rsp"))
            })
            .map(|amount| amount.parse().unwrap())
            .collect();

        assert!(!amounts.is_empty());
        for amount in amounts {
            assert_eq!(amount % STACK_ALIGNMENT, 0, "seed {} padded by {}", seed, amount);
        }
    }
}

#[test]
fn unaligned_amount_is_rounded_down() {
    let mut section = section(
        Dialect::Gcc,
        &[
            "f:",
            "\tpushq\t%rbp",
            "\tpopq\t%rbp",
            "\tret",
            "\t.cfi_endproc",
        ],
    );

    pad(&mut section, 37);

    assert_eq!(contents(&section)[2], "\tsubq $32, %rsp");
}
