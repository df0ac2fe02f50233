use std::fmt;

use url::form_urlencoded;

pub const API_PATH: &str = "api.php";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    path: String,
    params: Vec<(String, String)>,
}

impl Request {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_write(&self) -> bool {
        self.method == Method::Post
    }

    pub fn encoded_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.params {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self.method {
            Method::Get => "GET",
            Method::Post => "POST",
        };
        write!(f, "{method} {}?{}", self.path, self.encoded_query())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiRequestBuilder {
    params: Vec<(String, String)>,
}

impl ApiRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(self, action: &str) -> Self {
        self.param("action", action)
    }

    pub fn format_xml(self) -> Self {
        self.param("format", "xml")
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        if value.is_empty() {
            return self;
        }
        if let Some(existing) = self.params.iter_mut().find(|(name, _)| name == key) {
            existing.1 = value;
        } else {
            self.params.push((key.to_string(), value));
        }
        self
    }

    pub fn param_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    pub fn build_get(self) -> Request {
        self.build(Method::Get)
    }

    pub fn build_post(self) -> Request {
        self.build(Method::Post)
    }

    fn build(self, method: Method) -> Request {
        Request {
            method,
            path: API_PATH.to_string(),
            params: self.params,
        }
    }
}

pub fn namespace_filter(namespaces: &[i32]) -> String {
    namespaces
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("|")
}
