//! Disjoint sets over dense integer indices, with path compression and
//! union by rank.

#[derive(Clone, Debug, Default)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Adds a singleton set and returns its element.
    pub fn add(&mut self) -> usize {
        let x = self.parent.len();
        self.parent.push(x);
        self.rank.push(0);
        x
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merges the sets of `a` and `b` and returns the root of the union.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return ra;
        }
        let (child, root) = match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => (ra, rb),
            std::cmp::Ordering::Greater => (rb, ra),
            std::cmp::Ordering::Equal => {
                self.rank[ra] += 1;
                (rb, ra)
            }
        };
        self.parent[child] = root;
        root
    }

    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unions_are_transitive() {
        let mut uf = UnionFind::new(6);
        uf.union(0, 1);
        uf.union(2, 3);
        assert!(!uf.same(1, 2));
        uf.union(1, 3);
        assert!(uf.same(0, 2));
        assert!(!uf.same(0, 4));
    }

    #[test]
    fn union_is_idempotent() {
        let mut uf = UnionFind::new(3);
        let r1 = uf.union(0, 1);
        let r2 = uf.union(1, 0);
        assert_eq!(r1, r2);
        assert_eq!(uf.find(0), uf.find(1));
        assert_eq!(uf.find(2), 2);
    }

    #[test]
    fn added_elements_start_alone() {
        let mut uf = UnionFind::new(2);
        let x = uf.add();
        assert_eq!(x, 2);
        assert_eq!(uf.len(), 3);
        assert!(!uf.same(x, 0));
        uf.union(x, 0);
        assert!(uf.same(x, 0));
    }

    #[test]
    fn find_stays_consistent_on_long_chains() {
        let n = 64;
        let mut uf = UnionFind::new(n);
        for i in 1..n {
            uf.union(i - 1, i);
        }
        let root = uf.find(0);
        assert!((0..n).all(|i| uf.find(i) == root));
    }
}
