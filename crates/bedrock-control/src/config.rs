use std::net::SocketAddr;

const DEV_JWT_SECRET: &str = "dev-insecure-change-me";

#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub listen: SocketAddr,
    pub database_url: String,
    pub jwt_secret: Vec<u8>,
}

impl ControlConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(8080);
        Ok(Self {
            listen: ([0, 0, 0, 0], port).into(),
            database_url,
            jwt_secret: jwt_secret_from_env(),
        })
    }
}

fn jwt_secret_from_env() -> Vec<u8> {
    let secret = ["BEDROCK_JWT_SECRET", "JWT_SECRET"]
        .iter()
        .find_map(|k| std::env::var(k).ok().filter(|v| !v.is_empty()));
    match secret {
        Some(s) => s.into_bytes(),
        None => {
            tracing::warn!("no JWT secret configured, using the development default");
            DEV_JWT_SECRET.as_bytes().to_vec()
        }
    }
}
