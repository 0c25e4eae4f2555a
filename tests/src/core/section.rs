use crate::{GCC_HEAP, LIBFIRM, init_tracing};
use asmrand_core::{AssemblyFile, DataSegment, Dialect, Line, PointerWidth, Section};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn section(text: &str, index: usize) -> Section {
    AssemblyFile::parse(text).unwrap().sections()[index].clone()
}

fn contents(section: &Section) -> Vec<String> {
    section.lines().iter().map(|line| line.content().to_string()).collect()
}

/// Label-delimited runs of an unshuffled extent; the first run may lack a label.
fn sub_runs(lines: &[String]) -> Vec<Vec<String>> {
    let mut runs: Vec<Vec<String>> = Vec::new();
    for line in lines {
        match runs.last_mut() {
            Some(run) if !Line::new(line.as_str(), 0).is_label() => run.push(line.clone()),
            _ => runs.push(vec![line.clone()]),
        }
    }
    runs
}

/// Is `output` the concatenation of some ordering of `runs`, each used exactly once?
fn is_run_permutation(output: &[String], mut runs: Vec<Vec<String>>) -> bool {
    let mut rest = output;
    while !rest.is_empty() {
        let Some(pos) = runs.iter().position(|run| rest.starts_with(run)) else {
            return false;
        };
        rest = &rest[runs[pos].len()..];
        runs.swap_remove(pos);
    }
    runs.is_empty()
}

fn gcc(lines: &[&str]) -> Section {
    let lines = lines
        .iter()
        .enumerate()
        .map(|(number, content)| Line::new(*content, number))
        .collect();
    Section::from_lines(lines, Dialect::Gcc)
}

#[test]
fn data_sub_runs_are_permuted() {
    init_tracing();
    let original = section(GCC_HEAP, 3);
    let before = contents(&original);
    let mut changed = false;

    for seed in 0..32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut shuffled = original.clone();
        assert_eq!(shuffled.randomize_segment(DataSegment::Data, &mut rng), 1);

        let after = contents(&shuffled);
        assert_eq!(after[0], "\t.data");
        assert!(is_run_permutation(&after[1..], sub_runs(&before[1..])), "seed {}", seed);
        changed |= after != before;
    }
    assert!(changed);
}

#[test]
fn rodata_opener_behind_blank_line_stays_in_place() {
    let original = section(LIBFIRM, 1);
    let before = contents(&original);

    let mut rng = StdRng::seed_from_u64(11);
    let mut shuffled = original.clone();
    assert_eq!(shuffled.randomize_segment(DataSegment::Rodata, &mut rng), 1);

    let after = contents(&shuffled);
    assert_eq!(after[..2], before[..2]);
    assert!(is_run_permutation(&after[2..], sub_runs(&before[2..])));
}

#[test]
fn other_segments_are_ignored() {
    let mut bss = section(GCC_HEAP, 4);
    let before = bss.clone();
    let mut rng = StdRng::seed_from_u64(0);

    assert_eq!(bss.randomize_segment(DataSegment::Data, &mut rng), 0);
    assert_eq!(bss.randomize_segment(DataSegment::Rodata, &mut rng), 0);
    assert_eq!(bss, before);
}

#[test]
fn single_object_is_not_counted() {
    let mut section = gcc(&["\t.bss", "only:", "\t.zero\t4"]);
    let mut rng = StdRng::seed_from_u64(0);
    assert_eq!(section.randomize_segment(DataSegment::Bss, &mut rng), 0);
}

#[test]
fn extent_stops_at_next_segment_directive() {
    let mut section = gcc(&[
        "\t.section\t.rodata",
        "a:",
        "\t.quad\t1",
        "b:",
        "\t.quad\t2",
        "\t.text",
        "c:",
        "\tret",
    ]);
    let mut rng = StdRng::seed_from_u64(5);
    assert_eq!(section.randomize_segment(DataSegment::Rodata, &mut rng), 1);

    let after = contents(&section);
    assert_eq!(after[5..], ["\t.text", "c:", "\tret"]);
}

#[test]
fn leading_unlabelled_run_moves_as_a_unit() {
    let lines = [
        "\t.data",
        "\t.align 4",
        "\t.type\ta, @object",
        "a:",
        "\t.long\t1",
        "b:",
        "\t.long\t2",
    ];
    let original = gcc(&lines);
    let before = contents(&original);
    let mut moved = false;

    for seed in 0..32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut shuffled = original.clone();
        shuffled.randomize_segment(DataSegment::Data, &mut rng);

        let after = contents(&shuffled);
        assert!(is_run_permutation(&after[1..], sub_runs(&before[1..])));
        let align = after.iter().position(|l| l == "\t.align 4").unwrap();
        assert_eq!(after[align + 1], "\t.type\ta, @object");
        moved |= align != 1;
    }
    assert!(moved);
}

#[test]
fn interleaved_runs_are_not_a_permutation() {
    let runs = vec![
        vec!["a:".to_string(), "x".to_string()],
        vec!["b:".to_string(), "y".to_string()],
    ];
    let output: Vec<String> = ["a:", "y", "b:", "x"].map(String::from).to_vec();
    assert!(!is_run_permutation(&output, runs));
}

#[test]
fn malloc_gets_padded_and_memcpy_does_not() {
    init_tracing();
    let mut fill = section(GCC_HEAP, 5);
    let mut rng = StdRng::seed_from_u64(42);

    assert_eq!(fill.randomize_malloc_calls(0..64, PointerWidth::Bits64, &mut rng), 1);

    let lines = contents(&fill);
    let malloc = lines.iter().position(|l| l == "\tcall\tmalloc@PLT").unwrap();
    let padding = lines[malloc - 1]
        .strip_prefix("\taddq $")
        .and_then(|rest| rest.strip_suffix(", %rdi"))
        .unwrap();
    assert!(padding.parse::<u64>().unwrap() < 64);

    let memcpy = lines.iter().position(|l| l == "\tcall\tmemcpy@PLT").unwrap();
    assert_eq!(lines[memcpy - 1], "\tleaq\tbuffer(%rip), %rdi");
    assert_eq!(lines.len(), section(GCC_HEAP, 5).len() + 1);
}

#[test]
fn thirty_two_bit_padding_adjusts_edi() {
    let mut section = gcc(&["f:", "\tmovl\t$8, %edi", "\tcall\tcalloc", "\tret"]);
    let mut rng = StdRng::seed_from_u64(1);

    assert_eq!(section.randomize_malloc_calls(0..16, PointerWidth::Bits32, &mut rng), 1);
    let lines = contents(&section);
    assert!(lines[2].starts_with("\tadd $"));
    assert!(lines[2].ends_with(", %edi"));
    assert_eq!(lines[3], "\tcall\tcalloc");
}

#[test]
fn operator_new_is_padded_in_libfirm_output() {
    let mut main = section(LIBFIRM, 3);
    let mut rng = StdRng::seed_from_u64(9);

    assert_eq!(main.randomize_malloc_calls(0..4096, PointerWidth::Bits64, &mut rng), 1);
    let lines = contents(&main);
    let call = lines.iter().position(|l| l == "\tcall\t_Znwm").unwrap();
    assert!(lines[call - 1].starts_with("\taddq $"));
}

#[test]
fn empty_padding_range_changes_nothing() {
    let mut fill = section(GCC_HEAP, 5);
    let before = fill.clone();
    let mut rng = StdRng::seed_from_u64(0);

    assert_eq!(fill.randomize_malloc_calls(0..0, PointerWidth::Bits64, &mut rng), 0);
    assert_eq!(fill, before);
}

#[test]
fn inserted_lines_are_numbered_from_section_start() {
    let mut fill = section(GCC_HEAP, 5);
    let start = fill.span().start;
    let mut rng = StdRng::seed_from_u64(0);
    fill.randomize_malloc_calls(1..2, PointerWidth::Bits64, &mut rng);

    for (offset, line) in fill.lines().iter().enumerate() {
        assert_eq!(line.number(), start + offset);
    }
    assert!(contents(&fill).contains(&"\taddq $1, %rdi".to_string()));
}

#[test]
fn leading_segment_directive_is_found_behind_blank_lines() {
    assert!(section(LIBFIRM, 1).starts_with_segment_statement());
    assert!(section(GCC_HEAP, 4).starts_with_segment_statement());
    assert!(!section(GCC_HEAP, 0).starts_with_segment_statement());
    assert!(!section(LIBFIRM, 3).starts_with_segment_statement());
}

#[test]
fn only_function_sections_expose_the_function_view() {
    assert!(section(GCC_HEAP, 0).as_function_mut().is_none());
    assert!(section(GCC_HEAP, 2).as_function_mut().is_none());
    assert!(section(GCC_HEAP, 6).as_function_mut().is_some());
}
