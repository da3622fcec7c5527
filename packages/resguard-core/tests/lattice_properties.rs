//! Property tests: lattice laws and worklist termination on randomly
//! generated control flow with nested loops.

use proptest::prelude::*;
use resguard_core::{
    AllocationTag, AnalysisConfig, AnalysisEngine, CellState, EffectTable, Expr, Function,
    Nullability, Program, Stmt, SymbolTable,
};

fn arb_tag() -> impl Strategy<Value = AllocationTag> {
    prop_oneof![
        Just(AllocationTag::Unallocated),
        Just(AllocationTag::Allocated),
        Just(AllocationTag::Freed),
        Just(AllocationTag::Unknown),
    ]
}

fn arb_null() -> impl Strategy<Value = Nullability> {
    prop_oneof![
        Just(Nullability::MaybeNull),
        Just(Nullability::NonNull),
        Just(Nullability::DefiniteNull),
    ]
}

fn arb_cell() -> impl Strategy<Value = CellState> {
    (arb_tag(), arb_null(), any::<bool>()).prop_map(|(tag, null, zeroed)| {
        let mut cell = CellState::new(tag, null);
        cell.zeroed = zeroed;
        cell
    })
}

proptest! {
    #[test]
    fn tag_join_commutative(a in arb_tag(), b in arb_tag()) {
        prop_assert_eq!(a.join(b), b.join(a));
    }

    #[test]
    fn tag_join_associative(a in arb_tag(), b in arb_tag(), c in arb_tag()) {
        prop_assert_eq!(a.join(b).join(c), a.join(b.join(c)));
    }

    #[test]
    fn tag_join_idempotent(a in arb_tag()) {
        prop_assert_eq!(a.join(a), a);
    }

    #[test]
    fn unknown_absorbs_any_tag(a in arb_tag()) {
        prop_assert_eq!(AllocationTag::Unknown.join(a), AllocationTag::Unknown);
        prop_assert_eq!(a.join(AllocationTag::Unknown), AllocationTag::Unknown);
    }

    #[test]
    fn nullability_join_laws(a in arb_null(), b in arb_null(), c in arb_null()) {
        prop_assert_eq!(a.join(b), b.join(a));
        prop_assert_eq!(a.join(b).join(c), a.join(b.join(c)));
        prop_assert_eq!(a.join(a), a);
    }

    #[test]
    fn cell_join_commutative_and_idempotent(a in arb_cell(), b in arb_cell()) {
        prop_assert_eq!(a.join(&b), b.join(&a));
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn cell_join_associative(a in arb_cell(), b in arb_cell(), c in arb_cell()) {
        prop_assert_eq!(a.join(&b).join(&c), a.join(&b.join(&c)));
    }
}

// ─── termination on random nested control flow ─────────────────────────────

const VARS: [&str; 4] = ["a", "b", "p", "q"];

fn arb_var() -> impl Strategy<Value = Expr> {
    prop::sample::select(&VARS[..]).prop_map(Expr::var)
}

fn arb_cond() -> impl Strategy<Value = Expr> {
    prop_oneof![
        arb_var(),
        arb_var().prop_map(Expr::not),
        Just(Expr::Int(1)),
    ]
}

fn arb_leaf_stmt() -> impl Strategy<Value = Stmt> {
    prop_oneof![
        (arb_var(), any::<i64>()).prop_map(|(v, i)| Stmt::assign(v, Expr::Int(i))),
        arb_var().prop_map(|v| Stmt::assign(v, Expr::call("kmalloc", vec![Expr::Int(8)]))),
        arb_var().prop_map(|v| Stmt::call("kfree", vec![v])),
        arb_var().prop_map(|v| Stmt::call("mutex_lock", vec![Expr::addr_of(v)])),
        arb_var().prop_map(|v| Stmt::call("mutex_unlock", vec![Expr::addr_of(v)])),
        Just(Stmt::ret_void()),
    ]
}

fn arb_stmt() -> impl Strategy<Value = Stmt> {
    arb_leaf_stmt().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            (arb_cond(), prop::collection::vec(inner.clone(), 1..4)).prop_map(|(c, body)| {
                Stmt::if_then(c, body)
            }),
            (
                arb_cond(),
                prop::collection::vec(inner.clone(), 1..4),
                prop::collection::vec(inner.clone(), 1..4),
            )
                .prop_map(|(c, t, e)| Stmt::if_else(c, t, e)),
            (arb_cond(), prop::collection::vec(inner, 1..4))
                .prop_map(|(c, body)| Stmt::loop_while(c, body)),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The worklist empties for any finite CFG, nested loops included.
    #[test]
    fn exploration_terminates(body in prop::collection::vec(arb_stmt(), 1..8)) {
        let program = Program::new(
            vec![Function::new("f", vec![], body)],
            SymbolTable::new(),
        );
        let engine = AnalysisEngine::new(
            program,
            AnalysisConfig {
                effect_table: EffectTable::kernel(),
                parallel: false,
                ..AnalysisConfig::default()
            },
        );
        let analysis = engine.analyze_function("f").unwrap();
        prop_assert!(analysis.status.is_complete());
    }

    /// Exploring the same function twice is deterministic.
    #[test]
    fn exploration_is_deterministic(body in prop::collection::vec(arb_stmt(), 1..8)) {
        let program = Program::new(
            vec![Function::new("f", vec![], body)],
            SymbolTable::new(),
        );
        let engine = AnalysisEngine::new(
            program,
            AnalysisConfig {
                effect_table: EffectTable::kernel(),
                parallel: false,
                ..AnalysisConfig::default()
            },
        );
        let first = engine.analyze_function("f").unwrap();
        let second = engine.analyze_function("f").unwrap();
        prop_assert_eq!(first.reports, second.reports);
    }
}
