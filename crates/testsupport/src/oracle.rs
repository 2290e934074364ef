//! Independent reference closures, written as plain set fixpoints with no
//! engine machinery, for checking recursion results.

use std::collections::BTreeSet;

type Pairs = BTreeSet<(i64, i64)>;

/// Closure of `SELECT a.c1, t.c2 FROM a, t WHERE t.c1 = a.c2`: each pass
/// composes every base edge with every pair produced by the previous pass.
pub fn reflexive_closure(base: &Pairs) -> Pairs {
    saturate(base, |_, _| true)
}

/// Closure of the ordered variant, which additionally requires both
/// operands to be strictly increasing pairs
/// (`... AND t.c2 > t.c1 AND a.c2 > a.c1`).
pub fn increasing_closure(base: &Pairs) -> Pairs {
    saturate(base, |(a1, a2), (t1, t2)| a2 > a1 && t2 > t1)
}

fn saturate(base: &Pairs, admit: impl Fn((i64, i64), (i64, i64)) -> bool) -> Pairs {
    let mut result = base.clone();
    let mut frontier = base.clone();
    loop {
        let mut produced = Pairs::new();
        for &(a1, a2) in base {
            for &(t1, t2) in &frontier {
                if t1 == a2 && admit((a1, a2), (t1, t2)) {
                    produced.insert((a1, t2));
                }
            }
        }
        let gained = produced.iter().any(|pair| !result.contains(pair));
        result.extend(produced.iter().copied());
        if !gained {
            return result;
        }
        frontier = produced;
    }
}
