// src/composer.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        image::ImageFile,
        post::{MAX_POST_CHARS, Post, PostDraft},
    },
    repo::posts::PostRepository,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudienceMode {
    CollegeWide,
    Department,
}

/// Read-only view of whether a composer has a submit in flight. Cloned out
/// of the composer so the rest of the screen can watch it while `submit`
/// holds the form.
#[derive(Debug, Clone, Default)]
pub struct SubmitStatus(Arc<AtomicBool>);

impl SubmitStatus {
    pub fn is_submitting(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Holds the in-flight flag for one submit and clears it when dropped, also
/// when the submit future is cancelled.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State of the "new post" form.
///
/// The department picker keeps its value while the college-wide switch is
/// on, so toggling back restores the previous choice.
#[derive(Debug)]
pub struct Composer {
    content: String,
    images: Vec<ImageFile>,
    mode: AudienceMode,
    department_id: Uuid,
    submitting: SubmitStatus,
}

impl Composer {
    /// A blank form scoped to the author's own department.
    pub fn new(own_department_id: Uuid) -> Self {
        Self {
            content: String::new(),
            images: Vec::new(),
            mode: AudienceMode::Department,
            department_id: own_department_id,
            submitting: SubmitStatus::default(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn images(&self) -> &[ImageFile] {
        &self.images
    }

    pub fn add_image(&mut self, image: ImageFile) {
        self.images.push(image);
    }

    pub fn remove_image(&mut self, index: usize) -> Option<ImageFile> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    pub fn mode(&self) -> AudienceMode {
        self.mode
    }

    pub fn set_college_wide(&mut self, college_wide: bool) {
        self.mode = if college_wide {
            AudienceMode::CollegeWide
        } else {
            AudienceMode::Department
        };
    }

    /// Picks a department and switches to department-scoped mode.
    pub fn select_department(&mut self, department_id: Uuid) {
        self.department_id = department_id;
        self.mode = AudienceMode::Department;
    }

    /// The picker value, kept even in college-wide mode.
    pub fn selected_department(&self) -> Uuid {
        self.department_id
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.is_submitting()
    }

    pub fn status(&self) -> SubmitStatus {
        self.submitting.clone()
    }

    pub fn remaining_chars(&self) -> i64 {
        MAX_POST_CHARS as i64 - self.content.trim().chars().count() as i64
    }

    pub fn can_submit(&self) -> bool {
        let length = self.content.trim().chars().count();
        !self.is_submitting() && length > 0 && length <= MAX_POST_CHARS
    }

    /// The draft that would be submitted right now.
    pub fn draft(&self) -> PostDraft {
        let draft = PostDraft::new(self.content.clone()).with_images(self.images.clone());
        match self.mode {
            AudienceMode::CollegeWide => draft.college_wide(),
            AudienceMode::Department => draft.in_department(self.department_id),
        }
    }

    /// Submits through the post repository. On success the text and images
    /// are cleared and the audience selection is kept; on failure the form is
    /// left as it was so the user can retry.
    pub async fn submit(&mut self, posts: &PostRepository) -> Result<Post, AppError> {
        if self.is_submitting() {
            return Err(AppError::Validation("A post is already being submitted".to_string()));
        }
        if !self.can_submit() {
            return Err(AppError::Validation(format!(
                "Post content must be between 1 and {MAX_POST_CHARS} characters"
            )));
        }

        let Some(in_flight) = InFlight::acquire(&self.submitting.0) else {
            return Err(AppError::Validation("A post is already being submitted".to_string()));
        };
        let result = posts.create_post(self.draft()).await;
        drop(in_flight);

        if result.is_ok() {
            self.content.clear();
            self.images.clear();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_own_department() {
        let cs = Uuid::new_v4();
        let composer = Composer::new(cs);
        assert_eq!(composer.mode(), AudienceMode::Department);

        let draft = composer.draft();
        assert!(!draft.is_college_wide);
        assert_eq!(draft.department_id, Some(cs));
    }

    #[test]
    fn college_wide_keeps_the_picker_value() {
        let cs = Uuid::new_v4();
        let ee = Uuid::new_v4();
        let mut composer = Composer::new(cs);
        composer.select_department(ee);
        composer.set_college_wide(true);

        let draft = composer.draft();
        assert!(draft.is_college_wide);
        assert_eq!(draft.department_id, None);
        assert_eq!(composer.selected_department(), ee);

        composer.set_college_wide(false);
        assert_eq!(composer.draft().department_id, Some(ee));
    }

    #[test]
    fn submit_is_gated_on_content() {
        let mut composer = Composer::new(Uuid::new_v4());
        assert!(!composer.can_submit());

        composer.set_content("   ");
        assert!(!composer.can_submit());

        composer.set_content("x".repeat(MAX_POST_CHARS + 1));
        assert!(!composer.can_submit());
        assert_eq!(composer.remaining_chars(), -1);

        composer.set_content("  hello  ");
        assert!(composer.can_submit());
    }

    #[test]
    fn in_flight_flag_is_shared_and_released_on_drop() {
        let composer = Composer::new(Uuid::new_v4());
        let status = composer.status();

        let guard = InFlight::acquire(&composer.submitting.0).unwrap();
        assert!(status.is_submitting());
        assert!(InFlight::acquire(&composer.submitting.0).is_none());

        drop(guard);
        assert!(!status.is_submitting());
        assert!(!composer.is_submitting());
    }

    #[test]
    fn images_can_be_removed_by_index() {
        let mut composer = Composer::new(Uuid::new_v4());
        composer.add_image(ImageFile::new("a.png", vec![1]));
        composer.add_image(ImageFile::new("b.png", vec![2]));

        assert_eq!(composer.remove_image(0).map(|f| f.file_name), Some("a.png".to_string()));
        assert!(composer.remove_image(5).is_none());
        assert_eq!(composer.images().len(), 1);
    }
}
