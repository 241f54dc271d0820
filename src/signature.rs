//! Mini-parser for type signatures.
//!
//! A signature is one character per element: `*` any, `V` void, `I` integer,
//! `S` string, `[` array-of (the element follows), `sNAME;` a named struct,
//! `?NAME;` an unresolved reference. Signatures are compared element-wise;
//! `*` matches anything.

/// One decoded signature element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigElem {
    Any,
    Void,
    Int,
    Str,
    Array,
    Struct(String),
    Unresolved(String),
}

pub struct SigParser {
    text: Vec<char>,
    pos: usize,
}

impl SigParser {
    pub fn new(signature: &str) -> Self {
        SigParser { text: signature.chars().collect(), pos: 0 }
    }

    fn cur(&self) -> char {
        self.text.get(self.pos).copied().unwrap_or('\0')
    }

    /// Next element, or `None` at the end of the signature. An unknown
    /// character also ends the walk; [`compatible`] then reports a mismatch.
    pub fn next_elem(&mut self) -> Option<SigElem> {
        let elem = match self.cur() {
            '*' => SigElem::Any,
            'V' => SigElem::Void,
            'I' => SigElem::Int,
            'S' => SigElem::Str,
            '[' => SigElem::Array,
            's' => return Some(SigElem::Struct(self.named())),
            '?' => return Some(SigElem::Unresolved(self.named())),
            _ => return None,
        };
        self.pos += 1;
        Some(elem)
    }

    fn named(&mut self) -> String {
        self.pos += 1;
        let mut name = String::new();
        while self.cur() != ';' && self.cur() != '\0' {
            name.push(self.cur());
            self.pos += 1;
        }
        self.pos += 1;
        name
    }
}

/// Element-wise compatibility: `want` may use `*` to match any remaining
/// shape; otherwise every element must match exactly.
pub fn compatible(want: &str, has: &str) -> bool {
    let mut p1 = SigParser::new(want);
    let mut p2 = SigParser::new(has);
    loop {
        match (p1.next_elem(), p2.next_elem()) {
            (None, None) => return true,
            (Some(SigElem::Any), _) => return true,
            (Some(a), Some(b)) => {
                if a != b {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// First element of a signature, used to classify expression results.
pub fn first_elem(signature: &str) -> Option<SigElem> {
    SigParser::new(signature).next_elem()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_elements() {
        let mut p = SigParser::new("I");
        assert_eq!(p.next_elem(), Some(SigElem::Int));
        assert_eq!(p.next_elem(), None);
    }

    #[test]
    fn array_of_struct() {
        let mut p = SigParser::new("[sPoint;");
        assert_eq!(p.next_elem(), Some(SigElem::Array));
        assert_eq!(p.next_elem(), Some(SigElem::Struct("Point".to_string())));
        assert_eq!(p.next_elem(), None);
    }

    #[test]
    fn compatibility() {
        assert!(compatible("I", "I"));
        assert!(compatible("*", "sFoo;"));
        assert!(compatible("[I", "[I"));
        assert!(compatible("sFoo;", "sFoo;"));
        assert!(!compatible("sFoo;", "sBar;"));
        assert!(!compatible("I", "S"));
        assert!(!compatible("[I", "I"));
        assert!(!compatible("I", "[I"));
    }
}
