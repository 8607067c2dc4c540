use std::io::BufRead;

use crate::{
    circuit::{Circuit, Node, NodeId, NodeLabel},
    literal::Literal,
    Error, Result,
};

/// Declared size of the compiled circuit. The compiler emits further
/// metadata fields on the same line; only the node count matters here.
#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    pub nodes: usize,
}

/// Reader for the compiler's circuit output. Nodes arrive in the compiler's
/// own numbering, leaves before the nodes referencing them and the root
/// last; they are stored at reversed indices (`v - source - 1`) so that the
/// root always ends up at node 0. The rest of the crate never sees the
/// source numbering.
pub struct CircuitReader<'a> {
    reader: &'a mut dyn BufRead,
}

impl Circuit {
    /// Parse a complete compiled circuit.
    pub fn from_compiled(reader: &mut dyn BufRead) -> Result<Circuit> {
        CircuitReader::new(reader).parse()
    }
}

impl<'a> CircuitReader<'a> {
    #[must_use]
    pub fn new(reader: &'a mut dyn BufRead) -> Self {
        CircuitReader { reader }
    }

    pub fn parse(&mut self) -> Result<Circuit> {
        let header = self.parse_header()?;

        let mut nodes = Vec::with_capacity(header.nodes);
        for source_idx in 0..header.nodes {
            let line = self.next_line()?.ok_or_else(|| {
                Error::Format(format!(
                    "expected {} node lines but the input ended after {source_idx}",
                    header.nodes
                ))
            })?;
            nodes.push(Self::parse_node_line(&line, source_idx, header.nodes)?);
        }

        // Source order is reversed wholesale; child references were already
        // translated while parsing.
        nodes.reverse();

        let variable_count = nodes
            .iter()
            .filter_map(|node| match &node.label {
                NodeLabel::Literal(literal) => Some(literal.variable().0),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        tracing::debug!(
            nodes = nodes.len(),
            variables = variable_count,
            "parsed compiled circuit"
        );

        Ok(Circuit::new(nodes, variable_count))
    }

    pub fn parse_header(&mut self) -> Result<Header> {
        let line = self
            .next_line()?
            .ok_or_else(|| Error::Format(String::from("missing header line")))?;

        let mut tokens = line.split_whitespace().peekable();

        // Some compilers prefix the header with a format tag; skip it.
        if tokens
            .peek()
            .is_some_and(|token| token.parse::<usize>().is_err())
        {
            tokens.next();
        }

        let nodes = match tokens.next() {
            Some(count) => count.parse::<usize>().map_err(|err| {
                Error::Format(format!("could not parse node count '{count}': {err}"))
            })?,
            None => return Err(Error::Format(String::from("header declares no node count"))),
        };

        if nodes == 0 {
            return Err(Error::Format(String::from(
                "circuit must contain at least one node",
            )));
        }

        Ok(Header { nodes })
    }

    fn parse_node_line(line: &str, source_idx: usize, total: usize) -> Result<Node> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&tag) = tokens.first() else {
            return Err(Error::Format(format!("node line {source_idx} is empty")));
        };

        match tag {
            "A" => {
                let arity = Self::parse_count(&tokens, 1, source_idx)?;
                if arity == 0 {
                    return Ok(Node {
                        label: NodeLabel::True,
                        children: Vec::new(),
                    });
                }

                Ok(Node {
                    label: NodeLabel::And(None),
                    children: Self::parse_children(&tokens[2..], arity, source_idx, total)?,
                })
            }
            "O" => {
                let decision = Self::parse_count(&tokens, 1, source_idx)?;
                let arity = Self::parse_count(&tokens, 2, source_idx)?;
                if arity == 0 {
                    return Ok(Node {
                        label: NodeLabel::False,
                        children: Vec::new(),
                    });
                }

                if arity != 2 {
                    return Err(Error::Format(format!(
                        "choice node {source_idx} declares {arity} children, expected 2"
                    )));
                }

                let decision = u32::try_from(decision).map_err(|_| {
                    Error::Format(format!(
                        "choice node {source_idx} carries an oversized decision variable"
                    ))
                })?;

                Ok(Node {
                    label: NodeLabel::Or(Some(decision.into())),
                    children: Self::parse_children(&tokens[3..], arity, source_idx, total)?,
                })
            }
            // Any other tag followed by a single integer is a literal leaf.
            _ => {
                let value = match tokens.get(1) {
                    Some(token) => token.parse::<i64>().ok(),
                    None => None,
                };

                let literal = value.and_then(Literal::from_dimacs).ok_or_else(|| {
                    Error::Format(format!(
                        "unrecognized node tag '{tag}' on line {source_idx}"
                    ))
                })?;

                if tokens.len() > 2 {
                    return Err(Error::Format(format!(
                        "literal node {source_idx} has trailing tokens"
                    )));
                }

                Ok(Node {
                    label: NodeLabel::Literal(literal),
                    children: Vec::new(),
                })
            }
        }
    }

    fn parse_count(tokens: &[&str], position: usize, source_idx: usize) -> Result<usize> {
        match tokens.get(position) {
            Some(token) => token.parse::<usize>().map_err(|err| {
                Error::Format(format!(
                    "node {source_idx}: could not parse field '{token}': {err}"
                ))
            }),
            None => Err(Error::Format(format!("node {source_idx} is truncated"))),
        }
    }

    fn parse_children(
        tokens: &[&str],
        arity: usize,
        source_idx: usize,
        total: usize,
    ) -> Result<Vec<NodeId>> {
        if tokens.len() != arity {
            return Err(Error::Format(format!(
                "node {source_idx} declares {arity} children but lists {}",
                tokens.len()
            )));
        }

        let mut children = Vec::with_capacity(arity);
        for token in tokens {
            let reference = token.parse::<usize>().map_err(|err| {
                Error::Format(format!(
                    "node {source_idx}: could not parse child '{token}': {err}"
                ))
            })?;

            // Children must already be defined, which keeps the circuit
            // acyclic and the stored child indices strictly leafward.
            if reference >= source_idx {
                return Err(Error::Format(format!(
                    "node {source_idx} references undefined node {reference}"
                )));
            }

            children.push(NodeId((total - reference - 1) as u32));
        }

        Ok(children)
    }

    /// Next non-empty line, `None` at end of input.
    fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            let mut buf = String::new();
            let read = self
                .reader
                .read_line(&mut buf)
                .map_err(|err| Error::Format(format!("could not read circuit text: {err}")))?;

            if read == 0 {
                return Ok(None);
            }

            if !buf.trim().is_empty() {
                return Ok(Some(buf.trim().to_owned()));
            }
        }
    }
}
