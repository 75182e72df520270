//! Resolves an opaque project id to the directory its tasks run in.

use std::path::{Component, Path, PathBuf};

/// Looks up a project's working directory. `None` means unknown project.
pub trait ProjectLookup: Send + Sync {
    fn working_dir(&self, project_id: &str) -> Option<PathBuf>;
}

/// Projects are subdirectories of a single root: `<root>/<project_id>`.
pub struct ProjectDirectory {
    root: PathBuf,
}

impl ProjectDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ProjectLookup for ProjectDirectory {
    fn working_dir(&self, project_id: &str) -> Option<PathBuf> {
        // A project id is a single path segment, never a traversal.
        let mut components = Path::new(project_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return None,
        }
        let dir = self.root.join(project_id);
        dir.is_dir().then_some(dir)
    }
}

/// No projects at all. Every lookup misses.
pub struct NoProjects;

impl ProjectLookup for NoProjects {
    fn working_dir(&self, _project_id: &str) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_subdirectory_resolves() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("site-1700000000")).unwrap();
        let projects = ProjectDirectory::new(dir.path());

        assert_eq!(
            projects.working_dir("site-1700000000"),
            Some(dir.path().join("site-1700000000"))
        );
    }

    #[test]
    fn missing_project_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let projects = ProjectDirectory::new(dir.path());
        assert!(projects.working_dir("nope").is_none());
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("inner")).unwrap();
        let projects = ProjectDirectory::new(dir.path().join("inner"));
        assert!(projects.working_dir("..").is_none());
        assert!(projects.working_dir("../inner").is_none());
        assert!(projects.working_dir("/etc").is_none());
        assert!(projects.working_dir("").is_none());
    }

    #[test]
    fn plain_file_is_not_a_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let projects = ProjectDirectory::new(dir.path());
        assert!(projects.working_dir("notes.txt").is_none());
    }

    #[test]
    fn no_projects_never_resolves() {
        assert!(NoProjects.working_dir("anything").is_none());
    }
}
