//! Abstract syntax tree and type table for the protocol DSL.

use std::collections::HashMap;

/// Index of a type in the [`TypeTable`]. Fields and declarations store ids;
/// forward references resolve by filling the id's table slot in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(usize);

/// Primitive types of the DSL.
///
/// `u1`..`u7` are sub-byte integers, `u8`/`char` one octet, `u16`/`u32`/`u64`
/// whole-byte network integers. `v32`/`v64` are the reserved variable-length
/// integers: recognized by the front end, rejected by the codec backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    Any,
    Void,
    Int,
    Str,
    U1,
    U2,
    U3,
    U4,
    U5,
    U6,
    U7,
    U8,
    Char,
    U16,
    U32,
    U64,
    V32,
    V64,
}

impl Prim {
    pub fn name(self) -> &'static str {
        match self {
            Prim::Any => "any",
            Prim::Void => "void",
            Prim::Int => "int",
            Prim::Str => "string",
            Prim::U1 => "u1",
            Prim::U2 => "u2",
            Prim::U3 => "u3",
            Prim::U4 => "u4",
            Prim::U5 => "u5",
            Prim::U6 => "u6",
            Prim::U7 => "u7",
            Prim::U8 => "u8",
            Prim::Char => "char",
            Prim::U16 => "u16",
            Prim::U32 => "u32",
            Prim::U64 => "u64",
            Prim::V32 => "v32",
            Prim::V64 => "v64",
        }
    }

    /// Wire width in bits for the integer primitives. `int` is an abstract
    /// arithmetic type with no wire width.
    pub fn bit_width(self) -> Option<u32> {
        match self {
            Prim::U1 => Some(1),
            Prim::U2 => Some(2),
            Prim::U3 => Some(3),
            Prim::U4 => Some(4),
            Prim::U5 => Some(5),
            Prim::U6 => Some(6),
            Prim::U7 => Some(7),
            Prim::U8 | Prim::Char => Some(8),
            Prim::U16 => Some(16),
            Prim::U32 | Prim::V32 => Some(32),
            Prim::U64 | Prim::V64 => Some(64),
            _ => None,
        }
    }

    pub fn is_var_int(self) -> bool {
        matches!(self, Prim::V32 | Prim::V64)
    }
}

/// All primitives, in seeding order for [`TypeTable::new`] and the symbol
/// table builtins.
pub const BUILTIN_PRIMS: [Prim; 18] = [
    Prim::Any,
    Prim::Void,
    Prim::Int,
    Prim::Str,
    Prim::U1,
    Prim::U2,
    Prim::U3,
    Prim::U4,
    Prim::U5,
    Prim::U6,
    Prim::U7,
    Prim::U8,
    Prim::Char,
    Prim::U16,
    Prim::U32,
    Prim::U64,
    Prim::V32,
    Prim::V64,
];

/// One interned type.
#[derive(Debug, Clone)]
pub enum Type {
    Prim(Prim),
    Array { elem: TypeId },
    Struct(StructDef),
    /// `type NAME impl` aliasing another entry.
    Alias(TypeId),
    /// Placeholder for a name referenced before its declaration.
    Unresolved { name: String },
}

/// A `defmsg` body: named ordered fields plus interleaved `//*` comments.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub notes: Vec<SrcComment>,
    pub line: usize,
}

/// One field of a message.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeId,
    pub limit: Option<NameRef>,
    pub max: Option<NameRef>,
    pub min: Option<NameRef>,
    pub equ: Option<NameRef>,
    pub xor: Option<NameRef>,
    pub exist_if: Option<Expr>,
    pub exist_follow_above: bool,
    pub comment: Option<SrcComment>,
    pub line: usize,
}

/// A bare name reference, optionally `this.`-prefixed.
#[derive(Debug, Clone)]
pub struct NameRef {
    pub this: bool,
    pub name: String,
    pub line: usize,
}

/// A `//*` documentation comment carried through to the output.
#[derive(Debug, Clone)]
pub struct SrcComment {
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int { value: u64, line: usize },
    Str { value: String, line: usize },
    Name(NameRef),
    Dot { host: Box<Expr>, name: String, line: usize },
    Index { host: Box<Expr>, index: Box<Expr>, line: usize },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr>, line: usize },
    Unary { op: UnOp, expr: Box<Expr>, line: usize },
}

impl Expr {
    pub fn line(&self) -> usize {
        match self {
            Expr::Int { line, .. }
            | Expr::Str { line, .. }
            | Expr::Dot { line, .. }
            | Expr::Index { line, .. }
            | Expr::Binary { line, .. }
            | Expr::Unary { line, .. } => *line,
            Expr::Name(r) => r.line,
        }
    }
}

/// `const NAME expr`; the expression folds to an integer or string at
/// emission time.
#[derive(Debug, Clone)]
pub struct ConstDef {
    pub name: String,
    pub value: Expr,
    pub line: usize,
}

/// One item of a `defid`/`defmid` group. `value` is assigned by the
/// analyzer; `bound_msg` is filled when a `bind` directive names this item.
#[derive(Debug, Clone)]
pub struct IdItem {
    pub name: String,
    pub explicit_base: Option<u64>,
    pub value: u64,
    pub bound_msg: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct IdGroupDef {
    pub name: String,
    pub is_msg_id: bool,
    pub items: Vec<IdItem>,
    pub notes: Vec<SrcComment>,
    pub line: usize,
}

/// `bind MID MSG` or `bind MID nil` (explicitly unbound).
#[derive(Debug, Clone)]
pub struct BindDef {
    pub id_name: String,
    pub msg_name: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct ExternDef {
    pub name: String,
    pub ty: TypeId,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct TypeAliasDef {
    pub name: String,
    pub ty: TypeId,
    pub line: usize,
}

/// Top-level declarations, in source order.
#[derive(Debug, Clone)]
pub enum Decl {
    Const(ConstDef),
    IdGroup(IdGroupDef),
    Message(TypeId),
    TypeAlias(TypeAliasDef),
    Bind(BindDef),
    Extern(ExternDef),
    Comment(SrcComment),
}

/// Root of a parsed program.
#[derive(Debug, Clone)]
pub struct Program {
    pub mspace: String,
    pub decls: Vec<Decl>,
    pub types: TypeTable,
}

/// Interning table for every type in the program.
///
/// Primitives are pre-seeded. An unknown name interns an [`Type::Unresolved`]
/// slot; a later `defmsg` or `type` declaration of the same name fills that
/// slot in place, so all referring fields resolve through the table without
/// shared mutable nodes.
#[derive(Debug, Clone)]
pub struct TypeTable {
    entries: Vec<Type>,
    by_name: HashMap<String, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut tb = TypeTable { entries: Vec::new(), by_name: HashMap::new() };
        for p in BUILTIN_PRIMS {
            let id = tb.push(Type::Prim(p));
            tb.by_name.insert(p.name().to_string(), id);
        }
        tb
    }

    fn push(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.entries.len());
        self.entries.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.entries[id.0]
    }

    /// Follow alias links to the underlying entry.
    pub fn resolved(&self, id: TypeId) -> TypeId {
        let mut id = id;
        while let Type::Alias(target) = &self.entries[id.0] {
            id = *target;
        }
        id
    }

    pub fn prim(&self, p: Prim) -> TypeId {
        // BUILTIN_PRIMS seeds entries in discriminant order.
        TypeId(p as usize)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Look up `name` or intern a placeholder slot for it.
    pub fn intern_unresolved(&mut self, name: &str) -> TypeId {
        if let Some(id) = self.lookup(name) {
            return id;
        }
        let id = self.push(Type::Unresolved { name: name.to_string() });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn array_of(&mut self, elem: TypeId) -> TypeId {
        self.push(Type::Array { elem })
    }

    /// Install a struct under its name, filling a placeholder slot when the
    /// name was forward-referenced. A resolved name is a duplicate.
    pub fn define_struct(&mut self, def: StructDef) -> Result<TypeId, String> {
        let name = def.name.clone();
        match self.lookup(&name) {
            None => {
                let id = self.push(Type::Struct(def));
                self.by_name.insert(name, id);
                Ok(id)
            }
            Some(id) => match &self.entries[id.0] {
                Type::Unresolved { .. } => {
                    self.entries[id.0] = Type::Struct(def);
                    Ok(id)
                }
                _ => Err(format!(
                    "duplicate type define, name: {}, old type: {}",
                    name,
                    self.signature(id)
                )),
            },
        }
    }

    /// Install `type name = target`. When `name` was forward-referenced the
    /// placeholder slot becomes an alias, which requires `target` to already
    /// be resolved.
    pub fn define_alias(&mut self, name: &str, target: TypeId) -> Result<TypeId, String> {
        match self.lookup(name) {
            None => {
                self.by_name.insert(name.to_string(), target);
                Ok(target)
            }
            Some(id) => match &self.entries[id.0] {
                Type::Unresolved { .. } => {
                    let target_unresolved = matches!(
                        self.entries[self.resolved(target).0],
                        Type::Unresolved { .. }
                    );
                    if id == target || target_unresolved {
                        return Err(format!(
                            "duplicate type define, name: {}, old type: {}",
                            name,
                            self.signature(id)
                        ));
                    }
                    self.entries[id.0] = Type::Alias(target);
                    Ok(id)
                }
                _ => Err(format!(
                    "duplicate type define, name: {}, old type: {}",
                    name,
                    self.signature(id)
                )),
            },
        }
    }

    /// Names still unresolved after parsing, in interning order.
    pub fn unresolved_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|t| match t {
                Type::Unresolved { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Single-character-per-element structural signature, used for type
    /// compatibility checks.
    pub fn signature(&self, id: TypeId) -> String {
        match &self.entries[self.resolved(id).0] {
            Type::Prim(p) => match p {
                Prim::Any => "*".to_string(),
                Prim::Void => "V".to_string(),
                Prim::Str => "S".to_string(),
                _ => "I".to_string(),
            },
            Type::Array { elem } => format!("[{}", self.signature(*elem)),
            Type::Struct(s) => format!("s{};", s.name),
            Type::Alias(t) => self.signature(*t),
            Type::Unresolved { name } => format!("?{};", name),
        }
    }

    /// Human-readable type description for error messages.
    pub fn describe(&self, id: TypeId) -> String {
        match &self.entries[self.resolved(id).0] {
            Type::Prim(p) => p.name().to_string(),
            Type::Array { elem } => format!("[]{}", self.describe(*elem)),
            Type::Struct(s) => format!("struct: {}", s.name),
            Type::Alias(t) => self.describe(*t),
            Type::Unresolved { name } => format!("undefined: {}", name),
        }
    }

    /// Wire width in bits when the resolved type is an integer primitive.
    pub fn int_width(&self, id: TypeId) -> Option<u32> {
        match self.entries[self.resolved(id).0] {
            Type::Prim(p) => p.bit_width(),
            _ => None,
        }
    }

    pub fn is_var_int(&self, id: TypeId) -> bool {
        match self.entries[self.resolved(id).0] {
            Type::Prim(p) => p.is_var_int(),
            _ => false,
        }
    }

    pub fn as_prim(&self, id: TypeId) -> Option<Prim> {
        match self.entries[self.resolved(id).0] {
            Type::Prim(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_struct(&self, id: TypeId) -> Option<&StructDef> {
        match &self.entries[self.resolved(id).0] {
            Type::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array_elem(&self, id: TypeId) -> Option<TypeId> {
        match &self.entries[self.resolved(id).0] {
            Type::Array { elem } => Some(*elem),
            _ => None,
        }
    }
}
