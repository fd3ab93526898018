//! Line alignment (Myers O(ND) difference algorithm) and unified-style
//! rendering with collapsed context.

use std::fmt::Display;
use std::ops::{Index, IndexMut, Range};

/// One step of an alignment between a baseline `a` and a current `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `a[i]` and `b[j]` are equal.
    Keep(usize, usize),
    /// `a[i]` is only in the baseline.
    Delete(usize),
    /// `b[j]` is only in the current sequence.
    Insert(usize),
}

impl Op {
    /// Whether the step is a difference.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        !matches!(self, Self::Keep(..))
    }
}

/// Number of differing steps.
#[must_use]
pub fn distance(ops: &[Op]) -> usize {
    ops.iter().filter(|op| op.is_change()).count()
}

/// Computes a shortest edit script turning `a` into `b`.
///
/// Uses the linear-space variant of the algorithm: the middle snake of each
/// range is searched from both ends and the halves are solved recursively.
/// Within a run of changes, deletions come before insertions.
pub fn diff<A, B>(a: &[A], b: &[B], eq: impl Fn(&A, &B) -> bool) -> Vec<Op> {
    let max_d = (a.len() + b.len() + 1) / 2 + 1;
    let mut search = Search {
        a,
        b,
        eq: &eq,
        forward: Diagonals::new(max_d),
        backward: Diagonals::new(max_d),
        ops: Vec::with_capacity(a.len().max(b.len())),
    };
    search.conquer(0..a.len(), 0..b.len());
    deletions_first(search.ops)
}

/// Furthest x reached on each diagonal `k = x - y`.
struct Diagonals {
    offset: isize,
    v: Vec<usize>,
}

impl Diagonals {
    fn new(max_d: usize) -> Self {
        Self {
            offset: max_d as isize,
            v: vec![0; 2 * max_d + 1],
        }
    }
}

impl Index<isize> for Diagonals {
    type Output = usize;

    fn index(&self, k: isize) -> &usize {
        &self.v[(k + self.offset) as usize]
    }
}

impl IndexMut<isize> for Diagonals {
    fn index_mut(&mut self, k: isize) -> &mut usize {
        &mut self.v[(k + self.offset) as usize]
    }
}

struct Search<'a, A, B, F> {
    a: &'a [A],
    b: &'a [B],
    eq: &'a F,
    forward: Diagonals,
    backward: Diagonals,
    ops: Vec<Op>,
}

impl<A, B, F: Fn(&A, &B) -> bool> Search<'_, A, B, F> {
    fn prefix_len(&self, a: Range<usize>, b: Range<usize>) -> usize {
        a.zip(b)
            .take_while(|&(i, j)| (self.eq)(&self.a[i], &self.b[j]))
            .count()
    }

    fn suffix_len(&self, a: Range<usize>, b: Range<usize>) -> usize {
        a.rev()
            .zip(b.rev())
            .take_while(|&(i, j)| (self.eq)(&self.a[i], &self.b[j]))
            .count()
    }

    /// Start of a snake on an optimal path through `a` x `b`.
    fn middle_snake(&mut self, a: Range<usize>, b: Range<usize>) -> Option<(usize, usize)> {
        let n = a.len();
        let m = b.len();
        let delta = n as isize - m as isize;
        let odd = delta & 1 == 1;
        self.forward[1] = 0;
        self.backward[1] = 0;

        let d_max = ((n + m + 1) / 2 + 1) as isize;
        for d in 0..d_max {
            for k in (-d..=d).rev().step_by(2) {
                let mut x = if k == -d || (k != d && self.forward[k - 1] < self.forward[k + 1]) {
                    self.forward[k + 1]
                } else {
                    self.forward[k - 1] + 1
                };
                let y = (x as isize - k) as usize;
                let start = (x, y);
                if x < n && y < m {
                    x += self.prefix_len(a.start + x..a.end, b.start + y..b.end);
                }
                self.forward[k] = x;
                if odd
                    && (k - delta).abs() < d
                    && self.forward[k] + self.backward[delta - k] >= n
                {
                    return Some((a.start + start.0, b.start + start.1));
                }
            }

            for k in (-d..=d).rev().step_by(2) {
                let mut x = if k == -d || (k != d && self.backward[k - 1] < self.backward[k + 1])
                {
                    self.backward[k + 1]
                } else {
                    self.backward[k - 1] + 1
                };
                let mut y = (x as isize - k) as usize;
                if x < n && y < m {
                    let common =
                        self.suffix_len(a.start..a.start + n - x, b.start..b.start + m - y);
                    x += common;
                    y += common;
                }
                self.backward[k] = x;
                if !odd
                    && (k - delta).abs() <= d
                    && self.backward[k] + self.forward[delta - k] >= n
                {
                    return Some((a.start + n - x, b.start + m - y));
                }
            }
        }
        None
    }

    fn conquer(&mut self, mut a: Range<usize>, mut b: Range<usize>) {
        let prefix = self.prefix_len(a.clone(), b.clone());
        self.ops
            .extend((0..prefix).map(|i| Op::Keep(a.start + i, b.start + i)));
        a.start += prefix;
        b.start += prefix;

        let suffix = self.suffix_len(a.clone(), b.clone());
        a.end -= suffix;
        b.end -= suffix;

        if a.is_empty() {
            self.ops.extend(b.clone().map(Op::Insert));
        } else if b.is_empty() {
            self.ops.extend(a.clone().map(Op::Delete));
        } else if let Some((x, y)) = self.middle_snake(a.clone(), b.clone()) {
            self.conquer(a.start..x, b.start..y);
            self.conquer(x..a.end, y..b.end);
        } else {
            self.ops.extend(a.clone().map(Op::Delete));
            self.ops.extend(b.clone().map(Op::Insert));
        }

        self.ops
            .extend((0..suffix).map(|i| Op::Keep(a.end + i, b.end + i)));
    }
}

/// Reorders every run of changes so that its deletions precede its
/// insertions.
fn deletions_first(ops: Vec<Op>) -> Vec<Op> {
    let mut ordered = Vec::with_capacity(ops.len());
    let mut inserts = Vec::new();
    for op in ops {
        match op {
            Op::Delete(_) => ordered.push(op),
            Op::Insert(_) => inserts.push(op),
            Op::Keep(..) => {
                ordered.append(&mut inserts);
                ordered.push(op);
            }
        }
    }
    ordered.append(&mut inserts);
    ordered
}

/// Writes the alignment as `-`, `+` and ` ` prefixed lines.
///
/// Kept lines are shown only next to a change: one before and one after.
/// Longer runs of kept lines collapse to a single `...` line.
pub fn render<A: Display, B: Display>(out: &mut String, ops: &[Op], a: &[A], b: &[B]) {
    let mut lines = ops.iter().map(|op| match *op {
        Op::Keep(_, j) => format!(" {}\n", b[j]),
        Op::Delete(i) => format!("-{}\n", a[i]),
        Op::Insert(j) => format!("+{}\n", b[j]),
    });

    let Some(mut pending) = lines.next() else {
        return;
    };
    // Lines still to print after the last change; negative once the
    // collapse marker has been written.
    let mut budget: i32 = if pending.starts_with(' ') { 0 } else { 2 };

    for line in lines {
        if !line.starts_with(' ') {
            budget = 3;
        }
        if budget > 0 {
            out.push_str(&pending);
            budget -= 1;
        } else if budget == 0 {
            out.push_str("...\n");
            budget -= 1;
        }
        pending = line;
    }

    if budget >= 1 {
        out.push_str(&pending);
    }
    if budget == 0 {
        out.push_str("...\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &str) -> Vec<&str> {
        s.split('\n').collect()
    }

    fn rendered(a: &[&str], b: &[&str]) -> String {
        let ops = diff(a, b, |x, y| x == y);
        let mut out = String::new();
        render(&mut out, &ops, a, b);
        out
    }

    #[test]
    fn test_identical() {
        let a = ["x", "y", "z"];
        let ops = diff(&a, &a, |x, y| x == y);
        assert_eq!(ops, vec![Op::Keep(0, 0), Op::Keep(1, 1), Op::Keep(2, 2)]);
        assert_eq!(distance(&ops), 0);
    }

    #[test]
    fn test_empty_sides() {
        let empty: [&str; 0] = [];
        assert!(diff(&empty, &empty, |x, y| x == y).is_empty());
        assert_eq!(
            diff(&empty, &["a", "b"], |x, y| x == y),
            vec![Op::Insert(0), Op::Insert(1)]
        );
        assert_eq!(
            diff(&["a", "b"], &empty, |x, y| x == y),
            vec![Op::Delete(0), Op::Delete(1)]
        );
    }

    #[test]
    fn test_deletions_before_insertions() {
        let ops = diff(&["a", "b", "c"], &["x", "y", "z"], |x, y| x == y);
        assert_eq!(
            ops,
            vec![
                Op::Delete(0),
                Op::Delete(1),
                Op::Delete(2),
                Op::Insert(0),
                Op::Insert(1),
                Op::Insert(2),
            ]
        );
    }

    #[test]
    fn test_minimal_script() {
        let a = lines("a\nb\nc\na\nb\nb\na");
        let b = lines("c\nb\na\nb\na\nc");
        let ops = diff(&a, &b, |x, y| x == y);
        assert_eq!(distance(&ops), 5);

        let kept_a: Vec<&str> = ops
            .iter()
            .filter_map(|op| match op {
                Op::Keep(i, _) => Some(a[*i]),
                _ => None,
            })
            .collect();
        let kept_b: Vec<&str> = ops
            .iter()
            .filter_map(|op| match op {
                Op::Keep(_, j) => Some(b[*j]),
                _ => None,
            })
            .collect();
        assert_eq!(kept_a, kept_b);
    }

    #[test]
    fn test_large_disjoint_inputs() {
        let a: Vec<String> = (0..2000).map(|i| format!("a{i}")).collect();
        let b: Vec<String> = (0..2000).map(|i| format!("b{i}")).collect();
        let ops = diff(&a, &b, |x, y| x == y);

        assert_eq!(ops.len(), 4000);
        assert_eq!(distance(&ops), 4000);
        assert!(ops[..2000].iter().all(|op| matches!(op, Op::Delete(_))));
        assert_eq!(ops[1999], Op::Delete(1999));
        assert_eq!(ops[2000], Op::Insert(0));
    }

    #[test]
    fn test_large_inputs_with_one_change() {
        let a: Vec<u32> = (0..5000).collect();
        let mut b = a.clone();
        b[2500] = 99_999;
        let ops = diff(&a, &b, |x, y| x == y);

        assert_eq!(distance(&ops), 2);
        assert_eq!(ops.len(), 5001);
        assert_eq!(ops[2500], Op::Delete(2500));
        assert_eq!(ops[2501], Op::Insert(2500));
    }

    #[test]
    fn test_render_added_line() {
        let a = [
            "CREATE TABLE `table1` (",
            "  `id` int NOT NULL,",
            "  `val` text NOT NULL DEFAULT '',",
            "  PRIMARY KEY (`id`)",
            ") ENGINE=InnoDB",
        ];
        let b = [
            "CREATE TABLE `table1` (",
            "  `id` int NOT NULL,",
            "  `val` text NOT NULL DEFAULT '',",
            "  `val2` int DEFAULT '0',",
            "  PRIMARY KEY (`id`)",
            ") ENGINE=InnoDB",
        ];
        assert_eq!(
            rendered(&a, &b),
            "...\n   `val` text NOT NULL DEFAULT '',\n+  `val2` int DEFAULT '0',\n   PRIMARY KEY (`id`)\n...\n"
        );
    }

    #[test]
    fn test_render_changed_row() {
        let a = ["(1, 'aaa', 10)", "(2, 'bbb', 200)", "(3, 'ccc', 30)"];
        let b = ["(1, 'aaa', 10)", "(2, 'bbb', 20)", "(3, 'ccc', 30)"];
        assert_eq!(
            rendered(&a, &b),
            " (1, 'aaa', 10)\n-(2, 'bbb', 200)\n+(2, 'bbb', 20)\n (3, 'ccc', 30)\n"
        );
    }

    #[test]
    fn test_render_change_at_edges() {
        assert_eq!(rendered(&["a", "b", "c"], &["x", "b", "c"]), "-a\n+x\n b\n...\n");
        assert_eq!(
            rendered(&["a", "b", "c", "d"], &["a", "b", "c", "x"]),
            "...\n c\n-d\n+x\n"
        );
    }

    #[test]
    fn test_render_collapses_between_changes() {
        let a = ["1", "2", "3", "4", "5", "6", "7"];
        let b = ["x", "2", "3", "4", "5", "6", "y"];
        assert_eq!(rendered(&a, &b), "-1\n+x\n 2\n...\n 6\n-7\n+y\n");
    }

    #[test]
    fn test_render_context_from_current_side() {
        let a = ["(1, 'old')", "(2, 'x')"];
        let b = ["(1, 'new')", "(3, 'y')"];
        let ops = diff(&a, &b, |x, y| x.as_bytes()[1] == y.as_bytes()[1]);
        let mut out = String::new();
        render(&mut out, &ops, &a, &b);
        assert_eq!(out, " (1, 'new')\n-(2, 'x')\n+(3, 'y')\n");
    }

    #[test]
    fn test_render_nothing() {
        let mut out = String::new();
        render::<&str, &str>(&mut out, &[], &[], &[]);
        assert!(out.is_empty());
    }
}
