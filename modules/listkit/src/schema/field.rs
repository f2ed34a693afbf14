use serde_json::Value;

use crate::domain::FieldOperation;
use crate::domain::access::AccessRule;
use crate::domain::hooks::{FieldHook, FieldInputArgs, FieldOperationArgs, FieldOutputArgs};

/// Field type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Checkbox,
    /// RFC 3339 string.
    Timestamp,
    /// Stored as an Argon2 PHC string.
    Password,
    Select { options: Vec<String> },
    Json,
    /// `reference` is `"List"` or `"List.field"`.
    Relationship { reference: String, many: bool },
    /// No storage column; computed by `resolveOutput`.
    Virtual,
}

impl FieldKind {
    /// Name used in "must be a ..." messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text | Self::Password | Self::Select { .. } => "string",
            Self::Integer => "integer",
            Self::Decimal => "number",
            Self::Checkbox => "boolean",
            Self::Timestamp => "valid timestamp",
            Self::Json => "JSON value",
            Self::Relationship { .. } => "relationship",
            Self::Virtual => "virtual",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Value(Value),
    /// Current time, for timestamp fields.
    Now,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValidation {
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Per-field read/create/update rules. Everything defaults to allow.
#[derive(Debug, Clone, Default)]
pub struct FieldAccess {
    read: AccessRule,
    create: AccessRule,
    update: AccessRule,
}

impl FieldAccess {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn read(mut self, rule: impl Into<AccessRule>) -> Self {
        self.read = rule.into();
        self
    }

    #[must_use]
    pub fn create(mut self, rule: impl Into<AccessRule>) -> Self {
        self.create = rule.into();
        self
    }

    #[must_use]
    pub fn update(mut self, rule: impl Into<AccessRule>) -> Self {
        self.update = rule.into();
        self
    }

    /// Same rule for read, create and update.
    #[must_use]
    pub fn all(rule: impl Into<AccessRule>) -> Self {
        let rule = rule.into();
        Self {
            read: rule.clone(),
            create: rule.clone(),
            update: rule,
        }
    }

    #[must_use]
    pub fn rule(&self, operation: FieldOperation) -> &AccessRule {
        match operation {
            FieldOperation::Read => &self.read,
            FieldOperation::Create => &self.create,
            FieldOperation::Update => &self.update,
        }
    }
}

/// Field builder.
///
/// ```
/// use listkit::schema::Field;
///
/// let title = Field::text().required().length(Some(3), Some(120));
/// let author = Field::relationship("User.posts");
/// let tags = Field::relationship("Tag").many();
/// ```
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) kind: FieldKind,
    pub(crate) label: Option<String>,
    pub(crate) validation: FieldValidation,
    pub(crate) default: Option<DefaultValue>,
    pub(crate) unique: bool,
    pub(crate) foreign_key: bool,
    pub(crate) access: FieldAccess,
    pub(crate) hooks: Vec<FieldHook>,
}

impl Field {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            label: None,
            validation: FieldValidation::default(),
            default: None,
            unique: false,
            foreign_key: false,
            access: FieldAccess::default(),
            hooks: Vec::new(),
        }
    }

    #[must_use]
    pub fn text() -> Self {
        Self::of(FieldKind::Text)
    }

    #[must_use]
    pub fn integer() -> Self {
        Self::of(FieldKind::Integer)
    }

    #[must_use]
    pub fn decimal() -> Self {
        Self::of(FieldKind::Decimal)
    }

    #[must_use]
    pub fn checkbox() -> Self {
        Self::of(FieldKind::Checkbox)
    }

    #[must_use]
    pub fn timestamp() -> Self {
        Self::of(FieldKind::Timestamp)
    }

    #[must_use]
    pub fn password() -> Self {
        Self::of(FieldKind::Password)
    }

    #[must_use]
    pub fn select<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(FieldKind::Select {
            options: options.into_iter().map(Into::into).collect(),
        })
    }

    #[must_use]
    pub fn json() -> Self {
        Self::of(FieldKind::Json)
    }

    /// Single relationship to `reference` (`"List"` or `"List.field"`).
    #[must_use]
    pub fn relationship(reference: impl Into<String>) -> Self {
        Self::of(FieldKind::Relationship {
            reference: reference.into(),
            many: false,
        })
    }

    #[must_use]
    pub fn r#virtual() -> Self {
        Self::of(FieldKind::Virtual)
    }

    // ── Modifiers ───────────────────────────────────────────────────

    /// Turn a relationship into a to-many relationship.
    #[must_use]
    pub fn many(mut self) -> Self {
        if let FieldKind::Relationship { many, .. } = &mut self.kind {
            *many = true;
        }
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.validation.required = true;
        self
    }

    /// Character-count bounds for text and password fields.
    #[must_use]
    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.validation.min_length = min;
        self.validation.max_length = max;
        self
    }

    #[must_use]
    pub fn min(mut self, min: f64) -> Self {
        self.validation.min = Some(min);
        self
    }

    #[must_use]
    pub fn max(mut self, max: f64) -> Self {
        self.validation.max = Some(max);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    #[must_use]
    pub fn default_now(mut self) -> Self {
        self.default = Some(DefaultValue::Now);
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Force this side of a one-to-one relationship to hold the foreign key.
    #[must_use]
    pub fn foreign_key(mut self) -> Self {
        self.foreign_key = true;
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn access(mut self, access: FieldAccess) -> Self {
        self.access = access;
        self
    }

    /// Append a hook stage. Stages of one kind run in registration order.
    #[must_use]
    pub fn hook(mut self, hook: FieldHook) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn resolve_input<F, Fut>(self, f: F) -> Self
    where
        F: Fn(FieldInputArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.hook(FieldHook::resolve_input(f))
    }

    #[must_use]
    pub fn before_operation<F, Fut>(self, f: F) -> Self
    where
        F: Fn(FieldOperationArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hook(FieldHook::before_operation(f))
    }

    #[must_use]
    pub fn after_operation<F, Fut>(self, f: F) -> Self
    where
        F: Fn(FieldOperationArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hook(FieldHook::after_operation(f))
    }

    #[must_use]
    pub fn resolve_output<F, Fut>(self, f: F) -> Self
    where
        F: Fn(FieldOutputArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.hook(FieldHook::resolve_output(f))
    }
}

/// A built field: name, label and everything the builder configured.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    label: String,
    kind: FieldKind,
    validation: FieldValidation,
    default: Option<DefaultValue>,
    unique: bool,
    foreign_key: bool,
    access: FieldAccess,
    hooks: Vec<FieldHook>,
}

impl FieldDescriptor {
    pub(crate) fn new(name: &str, field: Field) -> Self {
        let label = field.label.unwrap_or_else(|| humanize(name));
        let mut hooks = Vec::with_capacity(field.hooks.len() + 1);
        if field.kind == FieldKind::Password {
            hooks.push(crate::password::hashing_hook());
        }
        hooks.extend(field.hooks);
        Self {
            name: name.to_owned(),
            label,
            kind: field.kind,
            validation: field.validation,
            default: field.default,
            unique: field.unique,
            foreign_key: field.foreign_key,
            access: field.access,
            hooks,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub fn validation(&self) -> &FieldValidation {
        &self.validation
    }

    #[must_use]
    pub fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key
    }

    #[must_use]
    pub fn access(&self) -> &FieldAccess {
        &self.access
    }

    #[must_use]
    pub fn hooks(&self) -> &[FieldHook] {
        &self.hooks
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.kind == FieldKind::Virtual
    }

    #[must_use]
    pub fn is_relationship(&self) -> bool {
        matches!(self.kind, FieldKind::Relationship { .. })
    }

    /// `true` for fields backed by a scalar storage column.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        !self.is_virtual() && !self.is_relationship()
    }

    #[must_use]
    pub fn is_many(&self) -> bool {
        matches!(self.kind, FieldKind::Relationship { many: true, .. })
    }

    /// `(list, field)` of a relationship ref, or `None` if this is not a
    /// relationship or the ref is malformed.
    #[must_use]
    pub fn relationship_target(&self) -> Option<(&str, Option<&str>)> {
        let FieldKind::Relationship { reference, .. } = &self.kind else {
            return None;
        };
        parse_ref(reference)
    }
}

/// `"List"` -> `("List", None)`, `"List.field"` -> `("List", Some("field"))`.
pub(crate) fn parse_ref(reference: &str) -> Option<(&str, Option<&str>)> {
    let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    match reference.split_once('.') {
        Some((list, field)) if valid(list) && valid(field) => Some((list, Some(field))),
        None if valid(reference) => Some((reference, None)),
        _ => None,
    }
}

/// `"title"` -> `"Title"`, `"firstName"` -> `"First Name"`, `"created_at"` -> `"Created At"`.
pub(crate) fn humanize(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
