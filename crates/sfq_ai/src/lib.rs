pub mod agents;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod engine;
pub mod extract;
pub mod index;
pub mod local;
pub mod payload;
pub mod pipeline;
pub mod reader;
pub mod retrieve;

#[cfg(test)]
mod tests {
    use super::local::LocalClient;

    #[test]
    fn enforces_localhost_only_base_url() {
        assert!(LocalClient::new("http://127.0.0.1:11434").is_ok());
        assert!(LocalClient::new("http://127.0.0.1").is_ok());
        assert!(LocalClient::new("http://127.0.0.1:8008/").is_ok()); // trailing slash is trimmed

        assert!(LocalClient::new("http://localhost:11434").is_err());
        assert!(LocalClient::new("http://0.0.0.0:11434").is_err());
        assert!(LocalClient::new("http://[::1]:11434").is_err());
        assert!(LocalClient::new("https://example.com").is_err());

        // Prefix-based bypasses.
        assert!(LocalClient::new("http://127.0.0.1.evil.com:11434").is_err());
        assert!(LocalClient::new("http://127.0.0.1@evil.com:11434").is_err());
        assert!(LocalClient::new("http://127.0.0.1:").is_err());
        assert!(LocalClient::new("http://127.0.0.1:0").is_err());
        assert!(LocalClient::new("http://127.0.0.1:99999").is_err());
        assert!(LocalClient::new("http://127.0.0.1:11434/api").is_err());
    }
}
