//! Canonical Huffman code trees for entropy decoding.
//!
//! A DHT segment describes a table as 16 per-length code counts followed by
//! the symbol values in code order. Codes are assigned canonically: counting
//! up within a length, shifting left by one when advancing to the next length
//! (the `Generate_size_table`/`Generate_code_table` flowcharts in Annex C).
//!
//! Decoding walks the tree one bit at a time. That costs O(code length) bit
//! reads per symbol, which is fine for this decoder; codes are at most 16
//! bits long, so tree depth (and drop recursion) is bounded by 16.

use core::fmt;

use crate::bits::BitReader;
use crate::error::{Error, Result};

/// A binary code tree. Internal nodes have up to two children, leaves carry
/// the decoded symbol byte.
///
/// Nodes exclusively own their children, so teardown is the ordinary
/// recursive drop.
pub struct HuffTree {
    root: Node,
}

#[derive(Default)]
struct Node {
    children: [Option<Box<Node>>; 2],
    symbol: Option<u8>,
}

impl HuffTree {
    /// Builds a tree from the 16-entry code-length histogram and the ordered
    /// symbol list of a DHT segment.
    pub fn build(num_codes_per_length: &[u8; 16], symbols: &[u8]) -> Result<Self> {
        let mut root = Node::default();

        let mut next_code: u16 = 0;
        let mut symbol_iter = symbols.iter();
        for (code_length, &code_count) in num_codes_per_length.iter().enumerate() {
            let code_length = (code_length + 1) as u8; // 1-based

            next_code <<= 1;

            for _ in 0..code_count {
                let &symbol = symbol_iter
                    .next()
                    .ok_or_else(|| Error::structural("DHT symbol count mismatch"))?;
                root.insert(next_code, code_length, symbol);
                next_code += 1;
            }
        }

        Ok(Self { root })
    }

    /// Decodes one symbol, pulling bits from `reader` until a leaf is reached.
    pub fn decode_symbol(&self, reader: &mut BitReader<'_>) -> Result<u8> {
        let mut node = &self.root;
        loop {
            if let Some(symbol) = node.symbol {
                return Ok(symbol);
            }
            let bit = reader.read_bit()?;
            node = match &node.children[usize::from(bit)] {
                Some(child) => child,
                None => {
                    return Err(Error::structural(
                        "invalid Huffman code in scan data",
                    ));
                }
            };
        }
    }
}

impl Node {
    fn insert(&mut self, code: u16, length: u8, symbol: u8) {
        let mut node = self;
        for i in (0..length).rev() {
            let bit = usize::from((code >> i) & 1);
            node = node.children[bit].get_or_insert_with(Box::default);
        }
        node.symbol = Some(symbol);
    }
}

impl fmt::Debug for HuffTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Left-first traversal visits the codes in canonical order.
        fn walk(node: &Node, code: u16, depth: u8, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if let Some(symbol) = node.symbol {
                return writeln!(f, "{depth} {:01$b} -> {2:02x}", code, usize::from(depth), symbol);
            }
            for bit in 0..2u16 {
                if let Some(child) = &node.children[bit as usize] {
                    walk(child, (code << 1) | bit, depth + 1, f)?;
                }
            }
            Ok(())
        }
        walk(&self.root, 0, 0, f)
    }
}

/// The four table slots a baseline scan can reference: luminance/chrominance
/// times DC/AC. Indexed by `(Th << 1) | Tc`.
pub struct HuffmanTables {
    tables: [Option<HuffTree>; 4],
}

impl HuffmanTables {
    pub fn new() -> Self {
        Self {
            tables: [None, None, None, None],
        }
    }

    pub fn set(&mut self, index: u8, tree: HuffTree) {
        self.tables[usize::from(index)] = Some(tree);
    }

    pub fn get(&self, index: u8) -> Result<&HuffTree> {
        self.tables[usize::from(index)]
            .as_ref()
            .ok_or_else(|| Error::structural(format!("scan references undefined Huffman table {index}")))
    }
}
