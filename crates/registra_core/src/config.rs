//! Service configuration.

use serde_json::Value;

/// Key assignment strategy for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// The caller supplies the key with the input.
    #[default]
    CallerSupplied,
    /// The store assigns keys from an integer sequence.
    AutoIncrement,
    /// The store assigns an opaque generated string.
    Generated,
}

impl IdStrategy {
    /// Whether the key is known before the insert executes.
    ///
    /// Drives the two-phase search-column write: when the key is unknown
    /// pre-insert, the derived search value is patched in a follow-up
    /// statement once the store has assigned the key.
    pub fn key_known_before_insert(self) -> bool {
        matches!(self, IdStrategy::CallerSupplied)
    }
}

/// Configuration of the derived search column.
#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    /// Fields contributing to the search value, in order.
    pub fields: Vec<String>,
    /// Contributing fields holding ISO-8601 timestamps; their value is
    /// truncated to the calendar date before joining.
    pub date_fields: Vec<String>,
}

impl SearchConfig {
    /// Creates a search configuration over the given fields.
    pub fn new(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            date_fields: Vec::new(),
        }
    }

    /// Marks fields as date-valued.
    #[must_use]
    pub fn date_fields(mut self, fields: &[&str]) -> Self {
        self.date_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

/// Configuration of one entity service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Collection the entity lives in.
    pub collection: String,
    /// Entity-type discriminator stamped on produced registry entries.
    pub entity_type_id: String,
    /// Key assignment strategy.
    pub id_strategy: IdStrategy,
    /// Derived search column, when maintained.
    pub search: Option<SearchConfig>,
    /// Fields stripped from input in `by_user` mode.
    pub forbidden_for_user_fields: Vec<String>,
    /// Field defaults applied when the input omits them.
    pub defaulted_fields: Vec<(String, Value)>,
    /// Fields the store requires but the user need not supply; defaulted
    /// to null when still absent after `defaulted_fields`.
    pub required_store_fields: Vec<String>,
    /// Registries this entity reads, un-posts or re-posts into.
    pub registries: Vec<String>,
    /// Registries that participate in post/un-post on every write.
    /// Must be a subset of `registries`.
    pub registrar_depended_registries: Vec<String>,
}

impl ServiceConfig {
    /// Creates a configuration for a collection with defaults: caller-
    /// supplied keys, no search column, no registries.
    pub fn new(collection: impl Into<String>) -> Self {
        let collection = collection.into();
        Self {
            entity_type_id: collection.clone(),
            collection,
            id_strategy: IdStrategy::default(),
            search: None,
            forbidden_for_user_fields: Vec::new(),
            defaulted_fields: Vec::new(),
            required_store_fields: Vec::new(),
            registries: Vec::new(),
            registrar_depended_registries: Vec::new(),
        }
    }

    /// Sets the entity-type discriminator.
    #[must_use]
    pub fn entity_type_id(mut self, id: impl Into<String>) -> Self {
        self.entity_type_id = id.into();
        self
    }

    /// Sets the key assignment strategy.
    #[must_use]
    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Enables the derived search column.
    #[must_use]
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = Some(search);
        self
    }

    /// Sets the fields stripped from user-originated input.
    #[must_use]
    pub fn forbidden_for_user(mut self, fields: &[&str]) -> Self {
        self.forbidden_for_user_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Adds a field default.
    #[must_use]
    pub fn default_field(mut self, field: impl Into<String>, value: Value) -> Self {
        self.defaulted_fields.push((field.into(), value));
        self
    }

    /// Sets the store-required fields.
    #[must_use]
    pub fn required_store_fields(mut self, fields: &[&str]) -> Self {
        self.required_store_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Sets the registries this entity touches.
    #[must_use]
    pub fn registries(mut self, names: &[&str]) -> Self {
        self.registries = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Sets the registrar-depended registries (post/un-post targets).
    #[must_use]
    pub fn registrar_depended_registries(mut self, names: &[&str]) -> Self {
        self.registrar_depended_registries = names.iter().map(|n| n.to_string()).collect();
        self
    }
}
