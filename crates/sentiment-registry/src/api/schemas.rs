use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct GetRunResponseSchema {
    pub run: RunSchema,
}

#[derive(Deserialize, Debug)]
pub struct RunSchema {
    pub info: RunInfoSchema,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RunInfoSchema {
    pub run_id: String,
    pub artifact_uri: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub experiment_id: Option<String>,
}
