use reqwest::Url;

use crate::error::{FetchError, FetchResult};

/// Public fleet API endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEndpoint {
    /// `GET /device`, optionally limited to each device's latest point.
    Devices { latest_point: bool },
}

impl DeviceEndpoint {
    fn path(&self) -> &'static str {
        match self {
            DeviceEndpoint::Devices { .. } => "device",
        }
    }

    fn extra_query(&self) -> Vec<(&'static str, String)> {
        match self {
            DeviceEndpoint::Devices { latest_point } => {
                vec![("latest_point", latest_point.to_string())]
            }
        }
    }

    /// Full request URL; the API key goes first on every endpoint.
    pub fn url(&self, base_url: &str, api_key: &str) -> FetchResult<Url> {
        let joined = format!("{}/{}", base_url.trim_end_matches('/'), self.path());
        let mut query = vec![("api-key", api_key.to_string())];
        query.extend(self.extra_query());
        Url::parse_with_params(&joined, &query).map_err(|e| FetchError::InvalidEndpoint(e.to_string()))
    }
}
