use super::TokenStore;

type Getter = Box<dyn Fn() -> Option<String> + Send + Sync>;
type Setter = Box<dyn Fn(Option<&str>) + Send + Sync>;

/// Adapts a caller-supplied accessor/mutator pair into a `TokenStore`.
pub struct FnTokenStore {
    getter: Getter,
    setter: Setter,
}

impl FnTokenStore {
    pub fn new<G, S>(getter: G, setter: S) -> Self
    where
        G: Fn() -> Option<String> + Send + Sync + 'static,
        S: Fn(Option<&str>) + Send + Sync + 'static,
    {
        Self { getter: Box::new(getter), setter: Box::new(setter) }
    }
}

impl std::fmt::Debug for FnTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("FnTokenStore") }
}

impl TokenStore for FnTokenStore {
    fn get(&self) -> Option<String> { (self.getter)() }

    fn set(&self, token: Option<&str>) { (self.setter)(token) }
}
