use crate::content::ContentLimits;
use crate::error::{PublishError, Result};
use crate::task::validate_platform_id;
use serde::{Deserialize, Serialize};
use url::Url;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// CSS selectors the automation uses on a site.
///
/// Selectors change whenever a site ships new markup, so they are plain data that
/// configuration can override.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SiteSelectors {
    /// Present only when the user is logged in
    pub login_indicator: String,
    pub qrcode: String,
    #[serde(default = "default_qrcode_attribute")]
    pub qrcode_attribute: String,
    pub video_input: String,
    pub image_input: String,
    pub title_input: String,
    pub body_input: String,
    pub tag_input: String,
    pub submit_button: String,
    /// Appears once media processing finished; without it the flow waits a fixed delay
    #[serde(default)]
    pub upload_complete: Option<String>,
    /// Appears after a successful submit; without it the flow waits a fixed delay
    #[serde(default)]
    pub publish_success: Option<String>,
    /// Attribute of the success element holding the post URL
    #[serde(default = "default_post_url_attribute")]
    pub post_url_attribute: String,
}

fn default_qrcode_attribute() -> String {
    "src".to_string()
}

fn default_post_url_attribute() -> String {
    "href".to_string()
}

/// Everything the generic automation needs to know about one platform
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SiteProfile {
    pub id: String,
    pub display_name: String,
    pub login_url: String,
    pub publish_url: String,
    /// Domain the saved cookies are restored under
    pub cookie_domain: String,
    /// Cookies worth persisting after login
    pub cookie_keys: Vec<String>,
    pub limits: ContentLimits,
    pub selectors: SiteSelectors,
}

impl SiteProfile {
    pub fn douyin() -> Self {
        Self {
            id: "douyin".to_string(),
            display_name: "Douyin".to_string(),
            login_url: "https://creator.douyin.com/creator-micro/content/publish".to_string(),
            publish_url: "https://creator.douyin.com/creator-micro/content/publish".to_string(),
            cookie_domain: ".douyin.com".to_string(),
            cookie_keys: strings(&["tt_webid", "passport_auth", "csrf_token", "ttcid", "sessionid"]),
            limits: ContentLimits {
                title_max_length: 30,
                body_max_length: 2000,
                max_images: 12,
                max_video_size: 4 * GIB,
                max_tags: 5,
                allowed_video_formats: strings(&[".mp4", ".mov", ".avi", ".mkv"]),
                allowed_image_formats: strings(&[".jpg", ".jpeg", ".png", ".webp"]),
            },
            selectors: SiteSelectors {
                login_indicator: ".login-avatar".to_string(),
                qrcode: ".qrcode-img".to_string(),
                qrcode_attribute: default_qrcode_attribute(),
                video_input: "input[type='file'][accept*='video']".to_string(),
                image_input: "input[type='file'][accept*='image']".to_string(),
                title_input: "input[placeholder*='标题']".to_string(),
                body_input: "textarea[placeholder*='正文']".to_string(),
                tag_input: "input[placeholder*='话题']".to_string(),
                submit_button: "button[type='submit']".to_string(),
                upload_complete: None,
                publish_success: None,
                post_url_attribute: default_post_url_attribute(),
            },
        }
    }

    pub fn toutiao() -> Self {
        Self {
            id: "toutiao".to_string(),
            display_name: "Toutiao".to_string(),
            login_url: "https://mp.toutiao.com/".to_string(),
            publish_url: "https://mp.toutiao.com/profile_v4/pub_article".to_string(),
            cookie_domain: ".toutiao.com".to_string(),
            cookie_keys: strings(&["sessionid", "passport_auth", "tt_token", "tt_webid"]),
            limits: ContentLimits {
                title_max_length: 30,
                body_max_length: 20000,
                max_images: 20,
                max_video_size: 2 * GIB,
                max_tags: 5,
                allowed_video_formats: strings(&[".mp4", ".mov"]),
                allowed_image_formats: strings(&[".jpg", ".jpeg", ".png", ".webp", ".gif"]),
            },
            selectors: SiteSelectors {
                login_indicator: ".user-avatar".to_string(),
                qrcode: ".qrcode-img, .qr-code".to_string(),
                qrcode_attribute: default_qrcode_attribute(),
                video_input: "input[type='file'][accept*='video']".to_string(),
                image_input: "input[type='file'][accept*='image']".to_string(),
                title_input: "textarea[placeholder*='标题'], input[placeholder*='标题']".to_string(),
                body_input: ".ProseMirror, textarea[placeholder*='正文']".to_string(),
                tag_input: "input[placeholder*='话题']".to_string(),
                submit_button: "button[type='submit'], .publish-btn".to_string(),
                upload_complete: None,
                publish_success: None,
                post_url_attribute: default_post_url_attribute(),
            },
        }
    }

    pub fn xiaohongshu() -> Self {
        Self {
            id: "xiaohongshu".to_string(),
            display_name: "Xiaohongshu".to_string(),
            login_url: "https://creator.xiaohongshu.com/".to_string(),
            publish_url: "https://creator.xiaohongshu.com/publish/publish".to_string(),
            cookie_domain: ".xiaohongshu.com".to_string(),
            cookie_keys: strings(&["web_session", "webId", "websectiga", "sec_poison_id"]),
            limits: ContentLimits {
                title_max_length: 20,
                body_max_length: 1000,
                max_images: 18,
                max_video_size: 500 * MIB,
                max_tags: 5,
                allowed_video_formats: strings(&[".mp4", ".mov"]),
                allowed_image_formats: strings(&[".jpg", ".jpeg", ".png", ".webp"]),
            },
            selectors: SiteSelectors {
                login_indicator: ".avatar-wrapper, .user-info".to_string(),
                qrcode: ".qrcode-img, img[class*='qrcode']".to_string(),
                qrcode_attribute: default_qrcode_attribute(),
                video_input: "input[type='file'][accept*='video']".to_string(),
                image_input: "input[type='file'][accept*='image']".to_string(),
                title_input: "input[placeholder*='标题'], input[name*='title']".to_string(),
                body_input: "textarea[placeholder*='正文'], textarea[name*='content']".to_string(),
                tag_input: "input[placeholder*='标签'], input[placeholder*='话题']".to_string(),
                submit_button: "button[type='submit'], .publish-btn, button[class*='publish']"
                    .to_string(),
                upload_complete: None,
                publish_success: None,
                post_url_attribute: default_post_url_attribute(),
            },
        }
    }

    /// Profiles shipped with the crate
    pub fn builtin() -> Vec<SiteProfile> {
        vec![Self::douyin(), Self::toutiao(), Self::xiaohongshu()]
    }

    pub fn builtin_by_id(id: &str) -> Option<SiteProfile> {
        Self::builtin().into_iter().find(|profile| profile.id == id)
    }

    /// Reject profiles the automation could not drive
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| PublishError::InvalidProfile {
            platform: self.id.clone(),
            reason,
        };

        validate_platform_id(&self.id).map_err(|e| invalid(e.to_string()))?;

        for (name, value) in [("login_url", &self.login_url), ("publish_url", &self.publish_url)] {
            let url = Url::parse(value).map_err(|e| invalid(format!("{} '{}': {}", name, value, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid(format!("{} must be http(s), got '{}'", name, value)));
            }
        }

        if self.cookie_keys.is_empty() {
            return Err(invalid("cookie_keys must not be empty".to_string()));
        }

        let selectors = &self.selectors;
        for (name, value) in [
            ("login_indicator", &selectors.login_indicator),
            ("qrcode", &selectors.qrcode),
            ("video_input", &selectors.video_input),
            ("image_input", &selectors.image_input),
            ("title_input", &selectors.title_input),
            ("body_input", &selectors.body_input),
            ("tag_input", &selectors.tag_input),
            ("submit_button", &selectors.submit_button),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("selector {} is empty", name)));
            }
        }

        Ok(())
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
