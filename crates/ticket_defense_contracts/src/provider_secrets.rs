#![forbid(unsafe_code)]

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderSecretId {
    GeminiApiKey,
    GoogleVisionApiKey,
    SupabaseServiceRoleKey,
    TrackingVerifierPepper,
}

impl ProviderSecretId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GeminiApiKey => "gemini_api_key",
            Self::GoogleVisionApiKey => "google_vision_api_key",
            Self::SupabaseServiceRoleKey => "supabase_service_role_key",
            Self::TrackingVerifierPepper => "tracking_verifier_pepper",
        }
    }

    /// Environment variables consulted before the device vault, in priority order.
    pub const fn env_var_names(self) -> &'static [&'static str] {
        match self {
            Self::GeminiApiKey => &["GEMINI_API_KEY", "VITE_GEMINI_API_KEY"],
            Self::GoogleVisionApiKey => &["GOOGLE_VISION_API_KEY"],
            Self::SupabaseServiceRoleKey => &["SUPABASE_SERVICE_ROLE_KEY"],
            Self::TrackingVerifierPepper => &["TRACKING_VERIFIER_PEPPER"],
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::GeminiApiKey,
            Self::GoogleVisionApiKey,
            Self::SupabaseServiceRoleKey,
            Self::TrackingVerifierPepper,
        ]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "gemini_api_key" => Some(Self::GeminiApiKey),
            "google_vision_api_key" => Some(Self::GoogleVisionApiKey),
            "supabase_service_role_key" => Some(Self::SupabaseServiceRoleKey),
            "tracking_verifier_pepper" => Some(Self::TrackingVerifierPepper),
            _ => None,
        }
    }

    pub fn allowed_key_names() -> Vec<&'static str> {
        Self::all().iter().map(|id| id.as_str()).collect()
    }
}
