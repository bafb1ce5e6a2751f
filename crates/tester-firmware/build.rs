//! Embeds the fallback station credentials from `.env` and links the esp-hal runtime.

const CREDENTIALS: [&str; 2] = ["WIFI_SSID", "WIFI_PASSWORD"];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    for key in CREDENTIALS {
        println!("cargo:rerun-if-env-changed={key}");
    }

    // A missing .env is fine; the variables may come from the environment.
    let _ = dotenvy::dotenv();

    for key in CREDENTIALS {
        let value = std::env::var(key).unwrap_or_default();
        if key == "WIFI_SSID" && value.is_empty() {
            println!("cargo:warning={key} is not set, only credentials already in flash will be used");
        }
        println!("cargo:rustc-env={key}={value}");
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
