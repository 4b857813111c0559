//! Chrome/Chromium discovery and launch, with stealth hardening applied to
//! every fresh page.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use crate::utils::constants::CHROME_USER_AGENT;

/// Flags that make the automated browser look less like one: disabled
/// infobars/notifications/first-run UI, relaxed sandboxing for containers,
/// and a handful of background services that add noise without adding
/// fidelity to a scraping session.
const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-notifications",
    "--disable-print-preview",
    "--disable-desktop-notifications",
    "--disable-software-rasterizer",
    "--disable-web-security",
    "--disable-features=IsolateOrigins,site-per-process,TranslateUI",
    "--disable-setuid-sandbox",
    "--no-first-run",
    "--no-default-browser-check",
    "--no-sandbox",
    "--ignore-certificate-errors",
    "--enable-features=NetworkService,NetworkServiceInProcess",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-component-extensions-with-background-pages",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-prompt-on-repost",
    "--metrics-recording-only",
    "--password-store=basic",
    "--use-mock-keychain",
    "--hide-scrollbars",
    "--mute-audio",
];

/// CDP errors chromiumoxide can't decode because Chrome sent an event shape
/// the crate doesn't model yet. Benign; logging them at `error` level would
/// just be noise on every run.
/// <https://github.com/mattsse/chromiumoxide/issues/167>, <https://github.com/mattsse/chromiumoxide/issues/229>
const BENIGN_HANDLER_ERRORS: &[&str] =
    &["data did not match any variant of untagged enum Message", "Failed to deserialize WS response"];

/// Locates a system Chrome/Chromium install, checking `CHROMIUM_PATH` first,
/// then common per-platform install paths, then `which`.
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!(path = %path.display(), "using browser from CHROMIUM_PATH");
            return Ok(path);
        }
        warn!(path = %path.display(), "CHROMIUM_PATH points to a nonexistent file, ignoring");
    }

    for path_str in platform_search_paths() {
        let path = resolve_search_path(&path_str);
        if path.as_ref().is_some_and(|p| p.exists()) {
            let path = path.unwrap();
            info!(path = %path.display(), "found browser on search path");
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in ["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Some(path) = which(cmd) {
                info!(path = %path.display(), "found browser via which");
                return Ok(path);
            }
        }
    }

    warn!("no Chrome/Chromium executable found, will download a managed copy");
    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

fn platform_search_paths() -> Vec<&'static str> {
    if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"%PROGRAMFILES%\Google\Chrome\Application\chrome.exe",
            r"%PROGRAMFILES(X86)%\Google\Chrome\Application\chrome.exe",
            r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
            r"C:\Program Files (x86)\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Google Chrome Beta.app/Contents/MacOS/Google Chrome Beta",
            "/Applications/Google Chrome Dev.app/Contents/MacOS/Google Chrome Dev",
            "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "~/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    }
}

fn resolve_search_path(path_str: &str) -> Option<PathBuf> {
    if let Some(rest) = path_str.strip_prefix("~/") {
        return dirs::home_dir().map(|home| home.join(rest));
    }
    if path_str.contains('%') && cfg!(target_os = "windows") {
        return Some(PathBuf::from(expand_windows_env_vars(path_str)));
    }
    Some(PathBuf::from(path_str))
}

fn which(cmd: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(cmd).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!path_str.is_empty()).then(|| PathBuf::from(path_str))
}

/// Expands `%VAR%` tokens in a Windows path, leaving unknown or malformed
/// tokens untouched.
fn expand_windows_env_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            result.push(ch);
            continue;
        }

        let mut var_name = String::new();
        let mut found_closing = false;
        for c in chars.by_ref() {
            if c == '%' {
                found_closing = true;
                break;
            }
            var_name.push(c);
        }

        match (found_closing, var_name.is_empty()) {
            (true, false) => match std::env::var(&var_name) {
                Ok(value) => result.push_str(&value),
                Err(_) => {
                    result.push('%');
                    result.push_str(&var_name);
                    result.push('%');
                }
            },
            (true, true) => result.push('%'),
            (false, _) => {
                result.push('%');
                result.push_str(&var_name);
            }
        }
    }

    result
}

/// Downloads a managed Chromium build into the user cache directory, for
/// hosts with no system Chrome installed.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("downloading managed Chromium build");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| {
            let fallback = std::env::temp_dir().join("iwsa_chrome_cache");
            warn!(path = %fallback.display(), "no system cache directory, falling back to temp dir");
            fallback
        })
        .join("iwsa")
        .join("chromium");

    std::fs::create_dir_all(&cache_dir).context("failed to create browser cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("failed to build browser fetcher options")?,
    );
    let revision_info = fetcher.fetch().await.context("failed to download browser")?;
    info!(path = %revision_info.folder_path.display(), "downloaded managed Chromium");
    Ok(revision_info.executable_path)
}

/// Finds or downloads Chrome/Chromium and launches it with stealth flags
/// applied, under its own user data directory so concurrent pool instances
/// don't contend on a profile lock.
pub async fn launch_browser(
    headless: bool,
    chrome_data_dir: Option<PathBuf>,
) -> Result<(Browser, JoinHandle<()>, PathBuf)> {
    let chrome_path = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let user_data_dir =
        chrome_data_dir.unwrap_or_else(|| std::env::temp_dir().join(format!("iwsa_chrome_{}", std::process::id())));
    std::fs::create_dir_all(&user_data_dir).context("failed to create user data directory")?;

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1920, 1080)
        .user_data_dir(user_data_dir.clone())
        .chrome_executable(chrome_path);

    config_builder = if headless {
        config_builder.headless_mode(HeadlessMode::default())
    } else {
        config_builder.with_head()
    };
    config_builder = config_builder.arg(format!("--user-agent={CHROME_USER_AGENT}"));
    for arg in STEALTH_ARGS {
        config_builder = config_builder.arg(*arg);
    }

    let browser_config =
        config_builder.build().map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

    info!(?browser_config, "launching browser");
    let (browser, mut handler) = Browser::launch(browser_config).await.context("failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let message = e.to_string();
                if BENIGN_HANDLER_ERRORS.iter().any(|benign| message.contains(benign)) {
                    trace!(error = %message, "suppressed benign CDP serialization error");
                } else {
                    error!(error = ?e, "browser handler error");
                }
            }
        }
        info!("browser handler task completed");
    });

    Ok((browser, handler_task, user_data_dir))
}

/// Injects stealth JavaScript into a fresh page: hides the `navigator.webdriver`
/// flag, normalizes `userAgent`/`languages`, and fakes a plausible plugin list
/// and WebGL vendor string so naive fingerprinting checks don't immediately
/// flag the session as automated.
pub async fn apply_stealth_measures(page: &chromiumoxide::Page) -> Result<()> {
    page.evaluate(stealth_script().as_str()).await.context("failed to inject stealth script")?;
    Ok(())
}

fn stealth_script() -> String {
    format!(
        r#"
        Object.defineProperty(navigator, 'webdriver', {{ get: () => false }});
        Object.defineProperty(navigator, 'userAgent', {{ value: '{user_agent}' }});
        Object.defineProperty(navigator, 'languages', {{ get: () => ['en-US', 'en'] }});

        (function() {{
            const mockPlugins = [
                {{ name: 'Chrome PDF Plugin', description: 'Portable Document Format', filename: 'internal-pdf-viewer', mimeTypes: [{{ type: 'application/pdf', description: 'Portable Document Format' }}] }},
                {{ name: 'Chrome PDF Viewer', description: '', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', mimeTypes: [{{ type: 'application/pdf', description: 'Portable Document Format' }}] }},
                {{ name: 'Native Client', description: '', filename: 'internal-nacl-plugin', mimeTypes: [] }},
            ];
            const pluginProto = Object.getPrototypeOf(navigator.plugins);
            Object.defineProperty(navigator, 'plugins', {{
                get: () => {{
                    const plugins = {{}};
                    mockPlugins.forEach((plugin, i) => {{
                        plugins[i] = plugin;
                        plugins[plugin.name] = plugin;
                    }});
                    Object.setPrototypeOf(plugins, pluginProto);
                    Object.defineProperty(plugins, 'length', {{ value: mockPlugins.length }});
                    return plugins;
                }},
            }});
        }})();

        if (!window.chrome) {{ window.chrome = {{}}; }}
        if (!window.chrome.runtime) {{
            window.chrome.runtime = {{
                connect: () => ({{
                    onMessage: {{ addListener: () => {{}}, removeListener: () => {{}} }},
                    postMessage: () => {{}},
                }}),
            }};
        }}

        if (window.WebGLRenderingContext) {{
            const getParameter = WebGLRenderingContext.prototype.getParameter;
            WebGLRenderingContext.prototype.getParameter = new Proxy(getParameter, {{
                apply: function(target, ctx, args) {{
                    const param = (args && args[0]) || null;
                    if (param === 37445) return 'Intel Inc.';
                    if (param === 37446) return 'Intel Iris OpenGL Engine';
                    return Reflect.apply(target, ctx, args);
                }},
            }});
        }}
        "#,
        user_agent = CHROME_USER_AGENT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_env_var() {
        unsafe {
            std::env::set_var("IWSA_TEST_VAR", "C:\\Foo");
        }
        assert_eq!(expand_windows_env_vars("%IWSA_TEST_VAR%\\bar"), "C:\\Foo\\bar");
        unsafe {
            std::env::remove_var("IWSA_TEST_VAR");
        }
    }

    #[test]
    fn unknown_env_var_token_is_preserved() {
        assert_eq!(expand_windows_env_vars("%NOT_A_REAL_VAR_XYZ%\\bar"), "%NOT_A_REAL_VAR_XYZ%\\bar");
    }

    #[test]
    fn malformed_token_without_closing_percent_is_preserved() {
        assert_eq!(expand_windows_env_vars("%UNCLOSED\\bar"), "%UNCLOSED\\bar");
    }

    #[test]
    fn stealth_script_embeds_configured_user_agent() {
        assert!(stealth_script().contains(CHROME_USER_AGENT));
    }
}
