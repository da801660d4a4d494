use chrono::Utc;

fn main() {
    // Use chrono instead of external command for cross-platform safety
    let date_string = Utc::now().format("%Y-%m-%d").to_string();
    println!("cargo:rustc-env=BUILD_DATE={}", date_string);
}
