/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::store::Store;

#[derive(Deserialize)]
struct ConfigFile {
    db_connect_string: Option<String>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug)]
pub struct Cfg {
    pub db_connect_string: String,
    pub addr: SocketAddr,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_connect_string: "host=localhost user=registrar_test password='registrar_test' dbname=registrar_test".to_owned(),
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                3333
            ),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_connect_string {
            c.db_connect_string = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }

        Ok(c)
    }

    /**
    The configuration the process should actually run with: defaults,
    overridden by the TOML file at `path` if one is there, overridden in
    turn by the `REGISTRAR_DB`, `REGISTRAR_HOST`, and `REGISTRAR_PORT`
    environment variables.
    */
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let mut c = if path.exists() {
            Self::from_file(path)?
        } else {
            log::info!(
                "No config file at {}; starting from defaults.",
                path.display()
            );
            Self::default()
        };

        if let Ok(s) = std::env::var("REGISTRAR_DB") {
            c.db_connect_string = s;
        }
        if let Ok(s) = std::env::var("REGISTRAR_HOST") {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing REGISTRAR_HOST {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Ok(s) = std::env::var("REGISTRAR_PORT") {
            let n: u16 = s.parse().map_err(|e| format!(
                "Error parsing REGISTRAR_PORT {:?} as port number: {}",
                &s, &e
            ))?;
            c.addr.set_port(n);
        }

        Ok(c)
    }
}

/**
This guy will haul around the shared state and be passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    pub store: Store,
    pub addr: SocketAddr,
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let cfg = Cfg::load(path)?;
    log::info!("Configuration:\n{:#?}", &cfg);

    log::trace!("Checking state of the DB...");
    let store = Store::new(cfg.db_connect_string.clone());
    if let Err(e) = store.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of the DB: {}", e.display());
        return Err(estr);
    }
    log::trace!("...DB okay.");

    let glob = Glob {
        store,
        addr: cfg.addr,
    };

    Ok(glob)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;

    fn scratch_file(name: &str, contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    #[serial]
    fn file_values_override_defaults() {
        ensure_logging();

        let path = scratch_file(
            "registrar_cfg_file_test.toml",
            r#"
db_connect_string = "host=db.example.com user=registrar dbname=registrar"
port = 8080
"#,
        );

        let cfg = Cfg::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            cfg.db_connect_string,
            "host=db.example.com user=registrar dbname=registrar"
        );
        // host was not given, so the default IP sticks around.
        assert_eq!(cfg.addr.to_string(), "0.0.0.0:8080");
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        ensure_logging();

        let path = scratch_file(
            "registrar_cfg_env_test.toml",
            "port = 8080\n",
        );

        std::env::set_var("REGISTRAR_HOST", "127.0.0.1");
        std::env::set_var("REGISTRAR_PORT", "9999");
        let cfg = Cfg::load(&path);
        std::env::remove_var("REGISTRAR_HOST");
        std::env::remove_var("REGISTRAR_PORT");
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cfg.unwrap().addr.to_string(), "127.0.0.1:9999");
    }

    #[test]
    #[serial]
    fn missing_file_is_fine() {
        ensure_logging();

        let cfg = Cfg::load("no_such_config_file.toml").unwrap();
        assert_eq!(cfg.addr.to_string(), "0.0.0.0:3333");
    }
}
