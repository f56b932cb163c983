//! Building the script and feature lists of GSUB and GPOS.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use write_fonts::types::Tag;

use crate::{
    common::tags,
    model::{Feature, LookupId},
};

use super::tables::layout::{self, FeatureList, LangSys, Script, ScriptList};

/// A feature registered for a particular script and language.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct FeatureKey {
    pub(crate) feature: Tag,
    pub(crate) script: Tag,
    pub(crate) language: Tag,
}

/// Collects the features of one table.
#[derive(Clone, Debug, Default)]
pub(crate) struct FeatureListBuilder {
    lookups: BTreeMap<FeatureKey, BTreeSet<u16>>,
}

impl FeatureListBuilder {
    /// Register every feature that references at least one lookup in this table.
    ///
    /// `lookup_indices` maps the lookups of the table to their positions in
    /// its lookup list; references to other lookups are ignored.
    pub(crate) fn new(features: &[Feature], lookup_indices: &HashMap<LookupId, u16>) -> Self {
        let mut builder = FeatureListBuilder::default();
        for feature in features {
            let indices = feature
                .lookups
                .iter()
                .filter_map(|id| lookup_indices.get(id).copied())
                .collect::<BTreeSet<_>>();
            if indices.is_empty() {
                continue;
            }
            let default_system = [(tags::SCRIPT_DFLT, tags::LANG_DFLT)];
            let systems = if feature.language_systems.is_empty() {
                &default_system[..]
            } else {
                feature.language_systems.as_slice()
            };
            for (script, language) in systems {
                let key = FeatureKey::new(feature.tag, *script, *language);
                builder
                    .lookups
                    .entry(key)
                    .or_default()
                    .extend(indices.iter().copied());
            }
        }
        builder
    }

    pub(crate) fn build(self) -> (ScriptList, FeatureList) {
        // features with the same tag and lookups are shared between systems
        let features = self
            .lookups
            .iter()
            .map(|(key, lookups)| (key.feature, lookups.iter().copied().collect::<Vec<_>>()))
            .collect::<BTreeSet<_>>();
        let feature_indices = features
            .iter()
            .enumerate()
            .map(|(i, feature)| (feature.clone(), i as u16))
            .collect::<HashMap<_, _>>();

        let mut scripts: BTreeMap<Tag, BTreeMap<Tag, BTreeSet<u16>>> = BTreeMap::new();
        for (key, lookups) in self.lookups {
            let lookups = lookups.into_iter().collect::<Vec<_>>();
            let idx = feature_indices[&(key.feature, lookups)];
            scripts
                .entry(key.script)
                .or_default()
                .entry(key.language)
                .or_default()
                .insert(idx);
        }
        log::debug!(
            "{} features in {} scripts",
            features.len(),
            scripts.len()
        );

        let scripts = scripts
            .into_iter()
            .map(|(script_tag, languages)| {
                let mut script = Script::default();
                for (lang_tag, indices) in languages {
                    let lang_sys = LangSys {
                        feature_indices: indices.into_iter().collect(),
                    };
                    if lang_tag == tags::LANG_DFLT {
                        script.default_lang_sys = Some(lang_sys);
                    } else {
                        script.lang_sys.push((lang_tag, lang_sys));
                    }
                }
                (script_tag, script)
            })
            .collect();
        let features = features
            .into_iter()
            .map(|(tag, lookup_indices)| (tag, layout::Feature { lookup_indices }))
            .collect();
        (ScriptList { scripts }, FeatureList { features })
    }
}

impl FeatureKey {
    pub(crate) fn new(feature: Tag, script: Tag, language: Tag) -> Self {
        FeatureKey {
            feature,
            script,
            language,
        }
    }
}

impl std::fmt::Debug for FeatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}/{}", self.feature, self.script, self.language)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{LayoutRules, Lookup, LookupKind};

    fn tag(s: &str) -> Tag {
        Tag::new_checked(s.as_bytes()).unwrap()
    }

    #[test]
    fn shared_features_and_sorted_scripts() {
        let mut rules = LayoutRules::new("Test");
        let one = rules.add_lookup(Lookup::new(LookupKind::SingleSub));
        let two = rules.add_lookup(Lookup::new(LookupKind::SingleSub));
        let pos = rules.add_lookup(Lookup::new(LookupKind::SinglePos));
        let mut liga = Feature::new(tag("liga"), vec![two, one, pos]);
        liga.language_systems = vec![
            (tag("latn"), tag("dflt")),
            (tag("latn"), tag("TRK ")),
            (tag("DFLT"), tag("dflt")),
        ];
        let mut smcp = Feature::new(tag("smcp"), vec![one]);
        smcp.language_systems = vec![(tag("latn"), tag("TRK "))];
        // no language systems: DFLT/dflt
        let calt = Feature::new(tag("calt"), vec![two]);
        // only GPOS lookups: not in this table
        let kern = Feature::new(tag("kern"), vec![pos]);

        let indices = HashMap::from([(one, 0), (two, 1)]);
        let features = [liga, smcp, calt, kern];
        let (scripts, features) = FeatureListBuilder::new(&features, &indices).build();

        let feature_tags = features
            .features
            .iter()
            .map(|(tag, feature)| (tag.to_string(), feature.lookup_indices.clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            feature_tags,
            vec![
                ("calt".to_string(), vec![1]),
                ("liga".to_string(), vec![0, 1]),
                ("smcp".to_string(), vec![0]),
            ]
        );
        let script_tags = scripts
            .scripts
            .iter()
            .map(|(tag, _)| tag.to_string())
            .collect::<Vec<_>>();
        assert_eq!(script_tags, ["DFLT", "latn"]);

        let (_, dflt) = &scripts.scripts[0];
        assert_eq!(
            dflt.default_lang_sys.as_ref().unwrap().feature_indices,
            vec![0, 1]
        );
        let (_, latn) = &scripts.scripts[1];
        assert_eq!(latn.default_lang_sys.as_ref().unwrap().feature_indices, vec![1]);
        assert_eq!(latn.lang_sys.len(), 1);
        assert_eq!(latn.lang_sys[0].1.feature_indices, vec![1, 2]);
    }

    #[test]
    fn dflt_script_accepts_other_languages() {
        let mut rules = LayoutRules::new("Test");
        let one = rules.add_lookup(Lookup::new(LookupKind::SingleSub));
        let mut feature = Feature::new(tag("locl"), vec![one]);
        feature.language_systems = vec![(tag("DFLT"), tag("ROM "))];
        let indices = HashMap::from([(one, 0)]);
        let (scripts, _) = FeatureListBuilder::new(&[feature], &indices).build();
        let (script, dflt) = &scripts.scripts[0];
        assert_eq!(*script, tags::SCRIPT_DFLT);
        assert!(dflt.default_lang_sys.is_none());
        assert_eq!(dflt.lang_sys[0].0, tag("ROM "));
    }
}
