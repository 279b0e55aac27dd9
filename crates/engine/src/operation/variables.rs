use fxhash::FxHashMap;

/// Variable values for one execution. The engine takes them as already
/// parsed JSON; coercion against the operation's variable definitions is the
/// transport layer's concern.
#[derive(Debug, Default, Clone)]
pub struct Variables(FxHashMap<String, serde_json::Value>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }
}

impl<S: Into<String>, V: Into<serde_json::Value>> FromIterator<(S, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Variables(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Variables {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().collect()
    }
}
