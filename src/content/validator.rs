//! Content validation against platform limits.
//!
//! Validation is pure and fails closed: every rule is checked and all violations are
//! reported together. Over-limit content is rejected, never truncated; shortening a
//! title to fit is a decision for whoever builds the [`Content`].

use crate::content::types::*;
use crate::error::PublishError;

/// Check `content` against `limits`, returning every violated rule.
pub fn validate(content: &Content, limits: &ContentLimits) -> Vec<Violation> {
    let mut violations = Vec::new();

    let title_len = content.title.chars().count();
    if title_len > limits.title_max_length {
        violations.push(Violation::new(
            ViolationField::Title,
            format!(
                "{} characters exceeds the limit of {}",
                title_len, limits.title_max_length
            ),
        ));
    }

    let body_len = content.body.chars().count();
    if body_len > limits.body_max_length {
        violations.push(Violation::new(
            ViolationField::Body,
            format!(
                "{} characters exceeds the limit of {}",
                body_len, limits.body_max_length
            ),
        ));
    }

    match content.content_type {
        ContentType::Images => check_images(content, limits, &mut violations),
        ContentType::Video => check_video(content, limits, &mut violations),
    }

    if content.tags.len() > limits.max_tags {
        violations.push(Violation::new(
            ViolationField::Tags,
            format!(
                "{} tags exceeds the limit of {}",
                content.tags.len(),
                limits.max_tags
            ),
        ));
    }

    violations
}

/// [`validate`], converted into a [`PublishError::Validation`] when anything is wrong.
pub fn ensure_valid(content: &Content, limits: &ContentLimits) -> Result<(), PublishError> {
    let violations = validate(content, limits);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(PublishError::Validation(violations))
    }
}

fn check_images(content: &Content, limits: &ContentLimits, violations: &mut Vec<Violation>) {
    if content.image_paths.is_empty() {
        violations.push(Violation::new(
            ViolationField::Images,
            "image posts require at least one image",
        ));
        return;
    }

    if content.image_paths.len() > limits.max_images {
        violations.push(Violation::new(
            ViolationField::Images,
            format!(
                "{} images exceeds the limit of {}",
                content.image_paths.len(),
                limits.max_images
            ),
        ));
    }

    for path in &content.image_paths {
        if !limits.allows_image_format(path) {
            violations.push(Violation::new(
                ViolationField::Images,
                format!("unsupported image format: {}", path.display()),
            ));
        }
    }
}

fn check_video(content: &Content, limits: &ContentLimits, violations: &mut Vec<Violation>) {
    let Some(path) = content
        .video_path
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
    else {
        violations.push(Violation::new(
            ViolationField::Video,
            "video posts require a video file",
        ));
        return;
    };

    if !limits.allows_video_format(path) {
        violations.push(Violation::new(
            ViolationField::Video,
            format!("unsupported video format: {}", path.display()),
        ));
    }

    if let Some(size) = content.video_size_bytes
        && size > limits.max_video_size
    {
        violations.push(Violation::new(
            ViolationField::Video,
            format!(
                "{} bytes exceeds the limit of {} bytes",
                size, limits.max_video_size
            ),
        ));
    }
}
