/// A unit of weekly learning content for a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub id: String,
    pub section: String,
    pub week: u32,
    pub title: String,
    pub body: String,
    pub is_placeholder: bool,
}

impl Material {
    /// Synthetic stand-in used when no content has been authored yet for a
    /// week, so callers always have something to present.
    #[must_use]
    pub fn placeholder(section: impl Into<String>, week: u32) -> Self {
        Self {
            id: format!("placeholder-{week}"),
            section: section.into(),
            week,
            title: format!("Week {week} content"),
            body: format!("Learning material for week {week} has not been published yet."),
            is_placeholder: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_flagged_and_addressable() {
        let m = Material::placeholder("Section A", 12);
        assert!(m.is_placeholder);
        assert_eq!(m.week, 12);
        assert_eq!(m.id, "placeholder-12");
    }
}
