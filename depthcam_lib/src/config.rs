use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Config {
    firmware: Option<Firmware>,
}

/// Firmware image locations, all optional
#[derive(Debug, Default, Deserialize)]
pub struct Firmware {
    pub dir: Option<String>,
    pub d4xx_image: Option<String>,
    pub sr3xx_image: Option<String>,
}

const CONFIG_FILE: &str = "depthcam_tool_config.toml";

fn read_config_file() -> Option<String> {
    // Next to the executable first, then the working directory
    if let Ok(mut path) = std::env::current_exe() {
        path.pop();
        path.push(CONFIG_FILE);
        if let Ok(str) = std::fs::read_to_string(&path) {
            return Some(str);
        }
    }
    std::fs::read_to_string(CONFIG_FILE).ok()
}

/// Firmware section of the tool config, if a config file exists
pub fn load_config() -> Option<Firmware> {
    let toml_str = read_config_file()?;
    let decoded: Config = match toml::from_str(&toml_str) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!("Failed to parse {}: {}", CONFIG_FILE, e);
            return None;
        }
    };
    debug!("{:?}", decoded);
    decoded.firmware
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_firmware_section() {
        let decoded: Config = toml::from_str(
            r#"
            [firmware]
            dir = "/usr/share/depthcam/firmware"
            d4xx_image = "d4xx-5.12.7.100.bin"
            "#,
        )
        .unwrap();
        let firmware = decoded.firmware.unwrap();
        assert_eq!(firmware.dir.as_deref(), Some("/usr/share/depthcam/firmware"));
        assert_eq!(firmware.d4xx_image.as_deref(), Some("d4xx-5.12.7.100.bin"));
        assert_eq!(firmware.sr3xx_image, None);
    }

    #[test]
    fn empty_config_is_fine() {
        let decoded: Config = toml::from_str("").unwrap();
        assert!(decoded.firmware.is_none());
    }
}
