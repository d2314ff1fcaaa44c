use super::source::expr_text;
use super::*;
use crate::frontend::DpexIntrinsics;
use crate::kir::{BinOp, Expr, Fence, IndexQuery, Place, Stmt};
use crate::reduction::ElemType;

fn lower(kernel: &Kernel) -> String {
    SourceLowering::new("dpex", 4).lower(kernel, &DpexIntrinsics)
}

#[test]
fn test_create_kernel_lowering() {
    assert!(create_kernel_lowering("dpex", 4).is_some());
    assert!(create_kernel_lowering("sycl", 4).is_some());
    assert!(create_kernel_lowering("cuda", 4).is_none());
    assert_eq!(create_kernel_lowering("dpex", 4).unwrap().target_name(), "dpex");
}

#[test]
fn test_lower_signature_and_return() {
    let kernel = Kernel::new("k", vec!["a".into(), "b".into()], vec![Stmt::Return]);
    assert_eq!(lower(&kernel), "def k(a, b):\n    return None\n");
}

#[test]
fn test_lower_intrinsics() {
    let kernel = Kernel::new(
        "k",
        vec![],
        vec![
            Stmt::assign("i", Expr::query(IndexQuery::GlobalId, 0)),
            Stmt::LocalArray {
                name: "buf".into(),
                len: 16,
                ty: ElemType::Int64,
            },
            Stmt::Barrier(Fence::Local),
        ],
    );
    assert_eq!(
        lower(&kernel),
        "def k():\n\
         \x20   i = dpex.get_global_id(0)\n\
         \x20   buf = dpex.local.array(16, dpnp.int64)\n\
         \x20   dpex.barrier(dpex.LOCAL_MEM_FENCE)\n"
    );
}

#[test]
fn test_lower_range_forms() {
    let kernel = Kernel::new(
        "k",
        vec!["n".into()],
        vec![
            Stmt::range("a", Expr::var("n"), vec![]),
            Stmt::For {
                var: "b".into(),
                start: Expr::int(2),
                stop: Expr::binary(BinOp::Add, Expr::var("n"), Expr::int(1)),
                step: Expr::int(1),
                body: vec![],
            },
            Stmt::For {
                var: "c".into(),
                start: Expr::int(0),
                stop: Expr::var("n"),
                step: Expr::int(3),
                body: vec![],
            },
        ],
    );
    let text = lower(&kernel);
    assert!(text.contains("    for a in range(n):\n        pass\n"));
    assert!(text.contains("    for b in range(2, n + 1):\n"));
    assert!(text.contains("    for c in range(0, n, 3):\n"));
}

#[test]
fn test_lower_nested_indentation() {
    let kernel = Kernel::new(
        "k",
        vec!["buf".into()],
        vec![
            Stmt::assign("s", Expr::int(2)),
            Stmt::While {
                cond: Expr::binary(BinOp::Gt, Expr::var("s"), Expr::int(0)),
                body: vec![
                    Stmt::If {
                        cond: Expr::binary(BinOp::Lt, Expr::int(0), Expr::var("s")),
                        then_body: vec![Stmt::update(
                            Place::index("buf", Expr::int(0)),
                            BinOp::Mul,
                            Expr::index("buf", Expr::var("s")),
                        )],
                    },
                    Stmt::update(Place::var("s"), BinOp::Shr, Expr::int(1)),
                ],
            },
        ],
    );
    let expected = "\
def k(buf):
    s = 2
    while s > 0:
        if 0 < s:
            buf[0] *= buf[s]
        s >>= 1
";
    assert_eq!(lower(&kernel), expected);
}

#[test]
fn test_custom_indent_width() {
    let kernel = Kernel::new(
        "k",
        vec![],
        vec![Stmt::range("j", Expr::int(4), vec![Stmt::Sentinel("mark".into())])],
    );
    let text = SourceLowering::new("dpex", 2).lower(&kernel, &DpexIntrinsics);
    assert_eq!(text, "def k():\n  for j in range(4):\n    mark = 0\n");
}

#[test]
fn test_expr_precedence_grouping() {
    let intr = DpexIntrinsics;
    // (a + b) * c
    let e = Expr::binary(
        BinOp::Mul,
        Expr::binary(BinOp::Add, Expr::var("a"), Expr::var("b")),
        Expr::var("c"),
    );
    assert_eq!(expr_text(&e, &intr), "(a + b) * c");
    // a - (b - c)
    let e = Expr::binary(
        BinOp::Sub,
        Expr::var("a"),
        Expr::binary(BinOp::Sub, Expr::var("b"), Expr::var("c")),
    );
    assert_eq!(expr_text(&e, &intr), "a - (b - c)");
    // a + b * c needs no grouping
    let e = Expr::binary(
        BinOp::Add,
        Expr::var("a"),
        Expr::binary(BinOp::Mul, Expr::var("b"), Expr::var("c")),
    );
    assert_eq!(expr_text(&e, &intr), "a + b * c");
    let sum = Expr::binary(BinOp::Add, Expr::var("i"), Expr::var("s"));
    assert_eq!(expr_text(&Expr::index("buf", sum), &intr), "buf[i + s]");
}
