use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateMaskedUrlRequest {
    pub url: String,
    #[serde(default)]
    pub filename: String,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendMaskedUrlRequest {
    pub seconds: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMaskedUrlsQuery {
    pub limit: Option<usize>,
}
