//! Configuration access port trait.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Section names, in file order.
    fn sections(&self) -> Vec<String> {
        Vec::new()
    }

    /// Comma-separated value split into trimmed, non-empty items.
    fn get_list(&self, section: &str, key: &str) -> Option<Vec<String>> {
        self.get_string(section, key).map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    /// Double that must be present and parse; `Ok(None)` when the key is absent.
    fn get_double_opt(&self, section: &str, key: &str) -> Result<Option<f64>, String> {
        match self.get_string(section, key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("expected a number, got {raw:?}")),
        }
    }
}
