use serde::{Deserialize, Serialize};

/// Stable identifier of a node inside one [`SyntaxTree`].
///
/// Ids are assigned in pre-order during ingest, so for nodes of the same
/// file a smaller id never starts after a larger one. Traversals use the id
/// as the deterministic tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Line/column pair as reported by the parser (1-based line, 0-based column).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

/// Source span of a node, inclusive start, exclusive end column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loc {
    pub start: Pos,
    pub end: Pos,
}

/// ECMAScript node kinds, matching the ESTree `type` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Program,
    FunctionDeclaration,
    FunctionExpression,
    ArrowFunctionExpression,
    BlockStatement,
    VariableDeclaration,
    VariableDeclarator,
    Identifier,
    PrivateIdentifier,
    Literal,
    TemplateLiteral,
    TemplateElement,
    TaggedTemplateExpression,
    MemberExpression,
    CallExpression,
    NewExpression,
    AssignmentExpression,
    BinaryExpression,
    LogicalExpression,
    ConditionalExpression,
    UnaryExpression,
    UpdateExpression,
    SequenceExpression,
    AwaitExpression,
    YieldExpression,
    ThisExpression,
    Super,
    ChainExpression,
    IfStatement,
    ForStatement,
    ForInStatement,
    ForOfStatement,
    WhileStatement,
    DoWhileStatement,
    SwitchStatement,
    SwitchCase,
    TryStatement,
    CatchClause,
    ThrowStatement,
    ReturnStatement,
    BreakStatement,
    ContinueStatement,
    LabeledStatement,
    ExpressionStatement,
    EmptyStatement,
    DebuggerStatement,
    WithStatement,
    ObjectExpression,
    Property,
    ArrayExpression,
    SpreadElement,
    ObjectPattern,
    ArrayPattern,
    AssignmentPattern,
    RestElement,
    ClassDeclaration,
    ClassExpression,
    ClassBody,
    MethodDefinition,
    PropertyDefinition,
    StaticBlock,
    ImportDeclaration,
    ImportSpecifier,
    ImportDefaultSpecifier,
    ImportNamespaceSpecifier,
    ImportExpression,
    ExportNamedDeclaration,
    ExportDefaultDeclaration,
    ExportAllDeclaration,
    ExportSpecifier,
    MetaProperty,
    /// Anything this analyzer has no special handling for.
    Other,
}

impl NodeKind {
    pub fn from_type(ty: &str) -> NodeKind {
        use NodeKind::*;
        match ty {
            "Program" => Program,
            "FunctionDeclaration" => FunctionDeclaration,
            "FunctionExpression" => FunctionExpression,
            "ArrowFunctionExpression" => ArrowFunctionExpression,
            "BlockStatement" => BlockStatement,
            "VariableDeclaration" => VariableDeclaration,
            "VariableDeclarator" => VariableDeclarator,
            "Identifier" => Identifier,
            "PrivateIdentifier" => PrivateIdentifier,
            "Literal" => Literal,
            "TemplateLiteral" => TemplateLiteral,
            "TemplateElement" => TemplateElement,
            "TaggedTemplateExpression" => TaggedTemplateExpression,
            "MemberExpression" => MemberExpression,
            "CallExpression" => CallExpression,
            "NewExpression" => NewExpression,
            "AssignmentExpression" => AssignmentExpression,
            "BinaryExpression" => BinaryExpression,
            "LogicalExpression" => LogicalExpression,
            "ConditionalExpression" => ConditionalExpression,
            "UnaryExpression" => UnaryExpression,
            "UpdateExpression" => UpdateExpression,
            "SequenceExpression" => SequenceExpression,
            "AwaitExpression" => AwaitExpression,
            "YieldExpression" => YieldExpression,
            "ThisExpression" => ThisExpression,
            "Super" => Super,
            "ChainExpression" => ChainExpression,
            "IfStatement" => IfStatement,
            "ForStatement" => ForStatement,
            "ForInStatement" => ForInStatement,
            "ForOfStatement" => ForOfStatement,
            "WhileStatement" => WhileStatement,
            "DoWhileStatement" => DoWhileStatement,
            "SwitchStatement" => SwitchStatement,
            "SwitchCase" => SwitchCase,
            "TryStatement" => TryStatement,
            "CatchClause" => CatchClause,
            "ThrowStatement" => ThrowStatement,
            "ReturnStatement" => ReturnStatement,
            "BreakStatement" => BreakStatement,
            "ContinueStatement" => ContinueStatement,
            "LabeledStatement" => LabeledStatement,
            "ExpressionStatement" => ExpressionStatement,
            "EmptyStatement" => EmptyStatement,
            "DebuggerStatement" => DebuggerStatement,
            "WithStatement" => WithStatement,
            "ObjectExpression" => ObjectExpression,
            "Property" => Property,
            "ArrayExpression" => ArrayExpression,
            "SpreadElement" => SpreadElement,
            "ObjectPattern" => ObjectPattern,
            "ArrayPattern" => ArrayPattern,
            "AssignmentPattern" => AssignmentPattern,
            "RestElement" => RestElement,
            "ClassDeclaration" => ClassDeclaration,
            "ClassExpression" => ClassExpression,
            "ClassBody" => ClassBody,
            "MethodDefinition" => MethodDefinition,
            "PropertyDefinition" => PropertyDefinition,
            "StaticBlock" => StaticBlock,
            "ImportDeclaration" => ImportDeclaration,
            "ImportSpecifier" => ImportSpecifier,
            "ImportDefaultSpecifier" => ImportDefaultSpecifier,
            "ImportNamespaceSpecifier" => ImportNamespaceSpecifier,
            "ImportExpression" => ImportExpression,
            "ExportNamedDeclaration" => ExportNamedDeclaration,
            "ExportDefaultDeclaration" => ExportDefaultDeclaration,
            "ExportAllDeclaration" => ExportAllDeclaration,
            "ExportSpecifier" => ExportSpecifier,
            "MetaProperty" => MetaProperty,
            _ => Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use NodeKind::*;
        match self {
            Program => "Program",
            FunctionDeclaration => "FunctionDeclaration",
            FunctionExpression => "FunctionExpression",
            ArrowFunctionExpression => "ArrowFunctionExpression",
            BlockStatement => "BlockStatement",
            VariableDeclaration => "VariableDeclaration",
            VariableDeclarator => "VariableDeclarator",
            Identifier => "Identifier",
            PrivateIdentifier => "PrivateIdentifier",
            Literal => "Literal",
            TemplateLiteral => "TemplateLiteral",
            TemplateElement => "TemplateElement",
            TaggedTemplateExpression => "TaggedTemplateExpression",
            MemberExpression => "MemberExpression",
            CallExpression => "CallExpression",
            NewExpression => "NewExpression",
            AssignmentExpression => "AssignmentExpression",
            BinaryExpression => "BinaryExpression",
            LogicalExpression => "LogicalExpression",
            ConditionalExpression => "ConditionalExpression",
            UnaryExpression => "UnaryExpression",
            UpdateExpression => "UpdateExpression",
            SequenceExpression => "SequenceExpression",
            AwaitExpression => "AwaitExpression",
            YieldExpression => "YieldExpression",
            ThisExpression => "ThisExpression",
            Super => "Super",
            ChainExpression => "ChainExpression",
            IfStatement => "IfStatement",
            ForStatement => "ForStatement",
            ForInStatement => "ForInStatement",
            ForOfStatement => "ForOfStatement",
            WhileStatement => "WhileStatement",
            DoWhileStatement => "DoWhileStatement",
            SwitchStatement => "SwitchStatement",
            SwitchCase => "SwitchCase",
            TryStatement => "TryStatement",
            CatchClause => "CatchClause",
            ThrowStatement => "ThrowStatement",
            ReturnStatement => "ReturnStatement",
            BreakStatement => "BreakStatement",
            ContinueStatement => "ContinueStatement",
            LabeledStatement => "LabeledStatement",
            ExpressionStatement => "ExpressionStatement",
            EmptyStatement => "EmptyStatement",
            DebuggerStatement => "DebuggerStatement",
            WithStatement => "WithStatement",
            ObjectExpression => "ObjectExpression",
            Property => "Property",
            ArrayExpression => "ArrayExpression",
            SpreadElement => "SpreadElement",
            ObjectPattern => "ObjectPattern",
            ArrayPattern => "ArrayPattern",
            AssignmentPattern => "AssignmentPattern",
            RestElement => "RestElement",
            ClassDeclaration => "ClassDeclaration",
            ClassExpression => "ClassExpression",
            ClassBody => "ClassBody",
            MethodDefinition => "MethodDefinition",
            PropertyDefinition => "PropertyDefinition",
            StaticBlock => "StaticBlock",
            ImportDeclaration => "ImportDeclaration",
            ImportSpecifier => "ImportSpecifier",
            ImportDefaultSpecifier => "ImportDefaultSpecifier",
            ImportNamespaceSpecifier => "ImportNamespaceSpecifier",
            ImportExpression => "ImportExpression",
            ExportNamedDeclaration => "ExportNamedDeclaration",
            ExportDefaultDeclaration => "ExportDefaultDeclaration",
            ExportAllDeclaration => "ExportAllDeclaration",
            ExportSpecifier => "ExportSpecifier",
            MetaProperty => "MetaProperty",
            Other => "Other",
        }
    }

    /// Function-like kinds, i.e. kinds that open a parameter scope.
    pub fn is_function(&self) -> bool {
        matches!(
            self,
            NodeKind::FunctionDeclaration
                | NodeKind::FunctionExpression
                | NodeKind::ArrowFunctionExpression
        )
    }

    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            NodeKind::ForStatement
                | NodeKind::ForInStatement
                | NodeKind::ForOfStatement
                | NodeKind::WhileStatement
                | NodeKind::DoWhileStatement
        )
    }
}

/// The ESTree field a node occupies inside its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    None,
    Body,
    Params,
    Id,
    Callee,
    Arguments,
    Object,
    Property,
    Left,
    Right,
    Init,
    Test,
    Update,
    Consequent,
    Alternate,
    Argument,
    Declarations,
    Expression,
    Expressions,
    Key,
    Value,
    Elements,
    Properties,
    Block,
    Handler,
    Finalizer,
    Param,
    Discriminant,
    Cases,
    Label,
    Quasi,
    Quasis,
    Tag,
    SuperClass,
    Source,
    Specifiers,
    Declaration,
    Local,
    Other,
}

impl Role {
    pub fn from_field(field: &str) -> Role {
        match field {
            "body" => Role::Body,
            "params" => Role::Params,
            "id" => Role::Id,
            "callee" => Role::Callee,
            "arguments" => Role::Arguments,
            "object" => Role::Object,
            "property" => Role::Property,
            "left" => Role::Left,
            "right" => Role::Right,
            "init" => Role::Init,
            "test" => Role::Test,
            "update" => Role::Update,
            "consequent" => Role::Consequent,
            "alternate" => Role::Alternate,
            "argument" => Role::Argument,
            "declarations" => Role::Declarations,
            "expression" => Role::Expression,
            "expressions" => Role::Expressions,
            "key" => Role::Key,
            "value" => Role::Value,
            "elements" => Role::Elements,
            "properties" => Role::Properties,
            "block" => Role::Block,
            "handler" => Role::Handler,
            "finalizer" => Role::Finalizer,
            "param" => Role::Param,
            "discriminant" => Role::Discriminant,
            "cases" => Role::Cases,
            "label" => Role::Label,
            "quasi" => Role::Quasi,
            "quasis" => Role::Quasis,
            "tag" => Role::Tag,
            "superClass" => Role::SuperClass,
            "source" => Role::Source,
            "specifiers" => Role::Specifiers,
            "declaration" => Role::Declaration,
            "local" => Role::Local,
            _ => Role::Other,
        }
    }
}

/// Kind-specific scalar attributes; most nodes carry none of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attrs {
    /// Identifier name.
    pub name: Option<String>,
    /// Literal raw text.
    pub raw: Option<String>,
    /// Literal value.
    pub value: Option<serde_json::Value>,
    /// Operator of binary/logical/assignment/unary/update expressions.
    pub operator: Option<String>,
    /// `computed` flag of member expressions and properties.
    pub computed: bool,
    /// `var`/`let`/`const` on variable declarations, property kind on
    /// properties and method definitions.
    pub decl_kind: Option<String>,
}

/// One node of a [`SyntaxTree`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Field this node occupies inside its parent.
    pub role: Role,
    /// Children in source order.
    pub children: Vec<NodeId>,
    pub range: (usize, usize),
    pub loc: Loc,
    pub attrs: Attrs,
}

impl Node {
    pub fn name(&self) -> Option<&str> {
        self.attrs.name.as_deref()
    }

    /// String value of a string literal, `None` for any other node.
    pub fn string_value(&self) -> Option<&str> {
        if self.kind != NodeKind::Literal {
            return None;
        }
        self.attrs.value.as_ref().and_then(|v| v.as_str())
    }
}

/// Arena of nodes for one parsed file.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    /// Path of the file the tree was parsed from.
    pub file: String,
    /// Full source text; used to extract `line_of_code` strings.
    pub source: String,
    nodes: Vec<Node>,
    root: NodeId,
}

impl SyntaxTree {
    pub(crate) fn from_nodes(file: String, source: String, nodes: Vec<Node>) -> SyntaxTree {
        SyntaxTree {
            file,
            source,
            nodes,
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.index()].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// All nodes in id (pre-)order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Children of `id` filling the given role, in source order.
    pub fn get(&self, id: NodeId, role: Role) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.node(c).role == role)
    }

    /// First child of `id` filling the given role.
    pub fn get_one(&self, id: NodeId, role: Role) -> Option<NodeId> {
        self.get(id, role).next()
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut cur = self.parent(id);
        std::iter::from_fn(move || {
            let next = cur?;
            cur = self.parent(next);
            Some(next)
        })
    }

    /// Nearest ancestor with one of the given kinds.
    pub fn ancestor_of_kind(&self, id: NodeId, kinds: &[NodeKind]) -> Option<NodeId> {
        self.ancestors(id).find(|&a| kinds.contains(&self.kind(a)))
    }

    /// Nearest ancestor (or `id` itself) with one of the given kinds.
    pub fn ancestor_or_self_of_kind(&self, id: NodeId, kinds: &[NodeKind]) -> Option<NodeId> {
        if kinds.contains(&self.kind(id)) {
            return Some(id);
        }
        self.ancestor_of_kind(id, kinds)
    }

    /// True when `id` lies inside the subtree rooted at `other` (or is it).
    pub fn is_inside_or_is(&self, id: NodeId, other: NodeId) -> bool {
        id == other || self.ancestors(id).any(|a| a == other)
    }

    /// Subtree of `id` in pre-order, including `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            for &c in self.children(cur).iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// The innermost enclosing function-like node, if any.
    pub fn enclosing_function(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id).find(|&a| self.kind(a).is_function())
    }

    /// Formats a node location as `"L:C - L:C"`.
    pub fn location(&self, id: NodeId) -> String {
        let loc = self.node(id).loc;
        format!(
            "{}:{} - {}:{}",
            loc.start.line, loc.start.column, loc.end.line, loc.end.column
        )
    }

    /// The whole source line the node starts on, trimmed.
    pub fn line_of_code(&self, id: NodeId) -> String {
        let line = self.node(id).loc.start.line;
        if line == 0 {
            return String::new();
        }
        self.source
            .lines()
            .nth(line - 1)
            .map(|l| l.trim().to_string())
            .unwrap_or_default()
    }

    /// Source-order comparison key: range start, then id.
    pub fn order_key(&self, id: NodeId) -> (usize, u32) {
        (self.node(id).range.0, id.0)
    }

    /// Dotted name of a callee or member expression, e.g.
    /// `chrome.runtime.onMessage.addListener`. Computed member accesses with
    /// string-literal keys are folded in; anything else truncates the name.
    pub fn dotted_name(&self, id: NodeId) -> Option<String> {
        match self.kind(id) {
            NodeKind::Identifier => self.node(id).name().map(|s| s.to_string()),
            NodeKind::ThisExpression => Some("this".to_string()),
            NodeKind::MemberExpression => {
                let object = self.get_one(id, Role::Object)?;
                let property = self.get_one(id, Role::Property)?;
                let base = self.dotted_name(object)?;
                let prop = if self.node(id).attrs.computed {
                    self.node(property).string_value()?.to_string()
                } else {
                    self.node(property).name()?.to_string()
                };
                Some(format!("{base}.{prop}"))
            }
            NodeKind::ChainExpression => {
                let inner = self.get_one(id, Role::Expression)?;
                self.dotted_name(inner)
            }
            NodeKind::CallExpression | NodeKind::NewExpression => {
                let callee = self.get_one(id, Role::Callee)?;
                self.dotted_name(callee)
            }
            _ => None,
        }
    }

    /// Root identifier of a (possibly nested) member expression, e.g. the
    /// `sender` of `sender.tab.url`.
    pub fn member_root(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::Identifier => Some(id),
            NodeKind::MemberExpression => {
                let object = self.get_one(id, Role::Object)?;
                self.member_root(object)
            }
            NodeKind::ChainExpression => {
                let inner = self.get_one(id, Role::Expression)?;
                self.member_root(inner)
            }
            _ => None,
        }
    }

    /// Positional arguments of a call expression, in source order.
    pub fn call_arguments(&self, call: NodeId) -> Vec<NodeId> {
        self.get(call, Role::Arguments).collect()
    }

    /// Whether an Identifier occurrence stands for a value, as opposed to a
    /// property name. Non-computed member properties and non-computed
    /// object/pattern property keys are names, not variable references.
    pub fn is_value_occurrence(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if node.kind != NodeKind::Identifier {
            return false;
        }
        let Some(parent) = node.parent else {
            return true;
        };
        let parent_node = self.node(parent);
        match parent_node.kind {
            NodeKind::MemberExpression => {
                node.role != Role::Property || parent_node.attrs.computed
            }
            NodeKind::Property => node.role != Role::Key || parent_node.attrs.computed,
            NodeKind::MethodDefinition | NodeKind::PropertyDefinition => {
                node.role != Role::Key || parent_node.attrs.computed
            }
            // Break/continue labels and import/export names are not values.
            NodeKind::BreakStatement | NodeKind::ContinueStatement | NodeKind::LabeledStatement => {
                node.role != Role::Label
            }
            NodeKind::ImportSpecifier | NodeKind::ExportSpecifier => false,
            NodeKind::MetaProperty => false,
            _ => true,
        }
    }
}
