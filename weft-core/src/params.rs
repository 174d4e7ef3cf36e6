//! Route parameters extracted while matching a request path.

/// Named route parameters extracted from the request path, in the order in
/// which they appear in the route pattern.
///
/// Lookups by name follow "last write wins": if the same name was pushed
/// more than once, the most recent value is returned.
///
/// # Examples
///
/// ```
/// use weft_core::params::Params;
///
/// let mut params = Params::new();
/// params.push("name", "sam");
/// assert_eq!(params.get("name"), Some("sam"));
/// assert_eq!(params.get("missing"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    params: Vec<(String, String)>,
}

impl Params {
    /// Creates an empty set of parameters.
    #[must_use]
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Appends a parameter.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::params::Params;
    ///
    /// let mut params = Params::new();
    /// params.push("id", "1");
    /// params.push("id", "2");
    /// assert_eq!(params.get("id"), Some("2"));
    /// assert_eq!(params.len(), 2);
    /// ```
    pub fn push<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        self.params.push((name.into(), value.into()));
    }

    /// Returns the value of the parameter named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the value of the parameter at the given position.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(|(_, value)| value.as_str())
    }

    /// Returns the name of the parameter at the given position.
    #[must_use]
    pub fn key_at_index(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(|(key, _)| key.as_str())
    }

    /// Iterates over the parameters in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.push(name, value);
        }
        params
    }
}
