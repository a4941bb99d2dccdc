/// Dependencies between the named values of one scope, as indices into
/// `names`. An edge `a -> b` means the expression of `a` mentions `b`.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    names: Vec<&'a str>,
    edges: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    New,
    Visiting,
    Done,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(names: Vec<&'a str>) -> Self {
        let edges = vec![Vec::new(); names.len()];
        Self { names, edges }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
        }
    }

    /// Dependency first order: every node comes after the nodes it depends
    /// on. On a cycle the sorted names of its members are returned instead.
    pub fn order(&self) -> Result<Vec<usize>, Vec<String>> {
        let mut marks = vec![Mark::New; self.len()];
        let mut order = Vec::with_capacity(self.len());
        let mut path = Vec::new();
        for start in 0..self.len() {
            self.visit(start, &mut marks, &mut path, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), Vec<String>> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let first = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut members: Vec<String> = path[first..]
                    .iter()
                    .map(|n| self.names[*n].to_string())
                    .collect();
                members.sort();
                return Err(members);
            }
            Mark::New => (),
        }
        marks[node] = Mark::Visiting;
        path.push(node);
        for dep in self.edges[node].iter() {
            self.visit(*dep, marks, path, order)?;
        }
        path.pop();
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DependencyGraph;

    #[test]
    fn dependencies_come_first() {
        // a = b + c, b = c, c = 1
        let mut graph = DependencyGraph::new(vec!["a", "b", "c"]);
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 2);
        assert_eq!(graph.order().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn cycle_members() {
        // x = 1, a = b + x, b = a + 1
        let mut graph = DependencyGraph::new(vec!["x", "b", "a"]);
        graph.add_edge(2, 1);
        graph.add_edge(2, 0);
        graph.add_edge(1, 2);
        assert_eq!(
            graph.order().unwrap_err(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn self_reference() {
        let mut graph = DependencyGraph::new(vec!["n"]);
        graph.add_edge(0, 0);
        assert_eq!(graph.order().unwrap_err(), vec!["n".to_string()]);
    }
}
