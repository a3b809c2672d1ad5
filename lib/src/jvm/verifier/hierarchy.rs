use std::collections::{HashMap, HashSet};

/// Knowledge about super classes, used when two different object types flow into the same
/// instruction and the frame needs a type that covers both
///
/// The answer only needs to be a common super class, not necessarily the closest one: the frame
/// just gets less precise. `java/lang/Object` is always a valid (if uninformative) answer.
pub trait ClassHierarchy: Send + Sync {
    /// Common super class of two classes given by internal name
    fn common_super_class(&self, class1: &str, class2: &str) -> String;
}

/// Hierarchy which knows nothing, so every pair of classes meets at `java/lang/Object`
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectHierarchy;

impl ClassHierarchy for ObjectHierarchy {
    fn common_super_class(&self, _class1: &str, _class2: &str) -> String {
        String::from("java/lang/Object")
    }
}

/// Hierarchy built from a table of class to super class
///
/// Classes missing from the table are treated as direct subclasses of `java/lang/Object`.
#[derive(Debug, Clone, Default)]
pub struct MapHierarchy {
    super_classes: HashMap<String, String>,
}

impl MapHierarchy {
    pub fn new() -> MapHierarchy {
        MapHierarchy::default()
    }

    /// Record the super class of a class
    pub fn insert(&mut self, class: &str, super_class: &str) -> &mut Self {
        self.super_classes
            .insert(class.to_owned(), super_class.to_owned());
        self
    }

    /// The class itself followed by all of its super classes
    fn ancestors<'a>(&'a self, class: &'a str) -> Vec<&'a str> {
        let mut chain = vec![class];
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = class;
        seen.insert(current);
        while let Some(parent) = self.super_classes.get(current) {
            let parent = parent.as_str();
            if !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }
}

impl ClassHierarchy for MapHierarchy {
    fn common_super_class(&self, class1: &str, class2: &str) -> String {
        let ancestors1: HashSet<&str> = self.ancestors(class1).into_iter().collect();
        self.ancestors(class2)
            .into_iter()
            .find(|class| ancestors1.contains(class))
            .unwrap_or("java/lang/Object")
            .to_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn walks_super_class_chains() {
        let mut hierarchy = MapHierarchy::new();
        hierarchy
            .insert("a/Cat", "a/Animal")
            .insert("a/Dog", "a/Animal")
            .insert("a/Animal", "java/lang/Object")
            .insert("a/Puppy", "a/Dog");

        assert_eq!(hierarchy.common_super_class("a/Cat", "a/Puppy"), "a/Animal");
        assert_eq!(hierarchy.common_super_class("a/Dog", "a/Puppy"), "a/Dog");
        assert_eq!(hierarchy.common_super_class("a/Cat", "b/Car"), "java/lang/Object");
        assert_eq!(ObjectHierarchy.common_super_class("a/Cat", "a/Cat"), "java/lang/Object");
    }

    #[test]
    fn cycles_do_not_hang() {
        let mut hierarchy = MapHierarchy::new();
        hierarchy.insert("x/A", "x/B").insert("x/B", "x/A");
        assert_eq!(hierarchy.common_super_class("x/A", "y/C"), "java/lang/Object");
    }
}
