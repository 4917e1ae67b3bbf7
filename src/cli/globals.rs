use secrecy::SecretString;

#[derive(Clone)]
pub struct GlobalArgs {
    pub provider_url: String,
    pub provider_key: SecretString,
    pub site_url: String,
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("provider_url", &self.provider_url)
            .field("provider_key", &"***")
            .field("site_url", &self.site_url)
            .finish()
    }
}

impl GlobalArgs {
    #[must_use]
    pub fn new(provider_url: String, provider_key: SecretString, site_url: String) -> Self {
        Self {
            provider_url,
            provider_key,
            site_url,
        }
    }
}
