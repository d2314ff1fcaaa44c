use super::*;
use crate::error::SynthError;
use crate::reduction::{Bound, ElemType, Literal};
use crate::synth::ReductionTemplate;

const FULL: &str = r#"
options:
  indent: 4
reductions:
  - { name: sum, op: "+", ty: float64 }
main:
  name: main_kernel
  params: [a, n, partials]
  args: [a, n, sum]
  index_vars: [i]
  loop_ranges:
    - { start: 0, stop: N }
  param_subst: { N: n }
  parallel_dims: 1
  work_group_size: 8
remainder:
  name: remainder_kernel
  params: [a, partials]
  index_vars: [i]
  global_size: [gs]
  global_size_mod: [gsm]
  partial_sum_size: [pss]
  partial_sum: [partials]
  final_sum: [result]
"#;

#[test]
fn test_options_defaults() {
    let opts = SynthOptions::default();
    assert_eq!(opts.sentinel, "__sentinel__");
    assert_eq!(opts.indent, 4);
    assert_eq!(opts.target, "dpex");

    let partial: SynthOptions = serde_yaml::from_str("indent: 2").unwrap();
    assert_eq!(partial.indent, 2);
    assert_eq!(partial.sentinel, DEFAULT_SENTINEL);
}

#[test]
fn test_parse_full_description() {
    let file = DescriptionFile::parse(FULL).unwrap();
    assert_eq!(file.reductions.len(), 1);
    assert_eq!(file.reductions[0].ty, ElemType::Float64);

    let main = file.tree_desc().unwrap();
    assert_eq!(main.kernel_name, "main_kernel");
    assert_eq!(main.reductions, file.reductions);
    assert_eq!(main.loop_ranges[0].start, Bound::Literal(0));
    assert_eq!(main.loop_ranges[0].stop, Bound::Symbol("N".into()));
    assert_eq!(main.loop_ranges[0].step, Bound::Literal(1));
    assert_eq!(main.param_subst.get("N").map(String::as_str), Some("n"));

    let rem = file.remainder_desc().unwrap();
    assert_eq!(rem.final_sum, vec!["result"]);
    assert_eq!(rem.reductions, file.reductions);
}

#[test]
fn test_section_reductions_override_shared() {
    let src = r#"
reductions:
  - { name: sum, op: add, ty: int64 }
remainder:
  name: r
  params: [p]
  index_vars: [i]
  reductions:
    - { name: prod, op: "*", ty: float32, init: 1.5 }
  global_size: [gs]
  global_size_mod: [gsm]
  partial_sum_size: [pss]
  partial_sum: [p]
  final_sum: [out]
"#;
    let file = DescriptionFile::parse(src).unwrap();
    let rem = file.remainder_desc().unwrap();
    assert_eq!(rem.reductions.len(), 1);
    assert_eq!(rem.reductions[0].name, "prod");
    assert_eq!(rem.reductions[0].init, Some(Literal::Float(1.5)));
    assert!(file.tree_desc().is_none());
}

#[test]
fn test_synthesize_both_kernels() {
    let set = DescriptionFile::parse(FULL).unwrap().synthesize().unwrap();
    let main = set.main.as_ref().unwrap();
    assert!(main
        .kernel_string()
        .contains("local_sums_sum = dpex.local.array(8, dpnp.float64)"));
    assert!(main.kernel_string().contains("partials[group_id0] = local_sums_sum[0]"));
    let rem = set.remainder.as_ref().unwrap();
    assert!(rem
        .kernel_string()
        .starts_with("def remainder_kernel(a, partials, gs, gsm, pss, result):"));
    assert_eq!(set.templates().len(), 2);
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reduce.yaml");
    std::fs::write(&path, FULL).unwrap();
    let file = DescriptionFile::load(&path).unwrap();
    assert!(file.main.is_some());
    assert!(file.remainder.is_some());
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = DescriptionFile::load(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, SynthError::Io(_)));
}

#[test]
fn test_malformed_yaml() {
    let err = DescriptionFile::parse("main: [unclosed").unwrap_err();
    assert!(matches!(err, SynthError::Config(_)));

    let err = DescriptionFile::parse("reductions:\n  - { name: s, op: add, ty: complex }\n")
        .unwrap_err();
    assert!(matches!(err, SynthError::Config(_)));
}

#[test]
fn test_unknown_target_in_options() {
    let src = "options:\n  target: ptx\n";
    let err = DescriptionFile::parse(src).unwrap().synthesize().unwrap_err();
    assert!(matches!(err, SynthError::UnknownTarget(t) if t == "ptx"));
}

#[test]
fn test_empty_file_synthesizes_nothing() {
    let set = DescriptionFile::parse("{}").unwrap().synthesize().unwrap();
    assert!(set.main.is_none());
    assert!(set.remainder.is_none());
}
