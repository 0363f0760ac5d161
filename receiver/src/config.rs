use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory uploads are saved under.
    pub save_root: PathBuf,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            save_root: std::env::var("SAVE_DIR")
                .unwrap_or_else(|_| "/data".to_string())
                .into(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8081".to_string())
                .parse()?,
        })
    }
}
