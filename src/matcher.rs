use crate::models::{ProductCatalog, ProductDefinition, RawOffer};

/// Lowercase, treat `-` and `_` as spaces, collapse runs of whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOutcome<'a> {
    Matched(&'a ProductDefinition),
    /// A catalog-wide exclusion hit before any definition was tried.
    Excluded,
    NoMatch,
}

impl<'a> MatchOutcome<'a> {
    pub fn product(self) -> Option<&'a ProductDefinition> {
        match self {
            MatchOutcome::Matched(def) => Some(def),
            _ => None,
        }
    }
}

struct CompiledDefinition<'a> {
    definition: &'a ProductDefinition,
    patterns: Vec<Vec<String>>,
    exclusions: Vec<String>,
}

/// Title matcher with patterns pre-normalized once per catalog.
pub struct Matcher<'a> {
    exclusions: Vec<String>,
    definitions: Vec<CompiledDefinition<'a>>,
}

impl<'a> Matcher<'a> {
    pub fn new(catalog: &'a ProductCatalog) -> Self {
        let definitions = catalog
            .products
            .iter()
            .map(|definition| CompiledDefinition {
                definition,
                patterns: definition
                    .patterns
                    .iter()
                    .map(|p| {
                        p.split('|')
                            .map(normalize_title)
                            .filter(|alt| !alt.is_empty())
                            .collect()
                    })
                    .collect(),
                exclusions: compile_keywords(&definition.exclusions),
            })
            .collect();

        Self {
            exclusions: compile_keywords(&catalog.exclusions),
            definitions,
        }
    }

    pub fn classify(&self, title: &str) -> MatchOutcome<'a> {
        let title = normalize_title(title);

        if self.exclusions.iter().any(|kw| title.contains(kw.as_str())) {
            return MatchOutcome::Excluded;
        }

        let mut best: Option<(&'a ProductDefinition, (usize, usize))> = None;
        for compiled in &self.definitions {
            if compiled.exclusions.iter().any(|kw| title.contains(kw.as_str())) {
                continue;
            }
            let Some(specificity) = compiled.specificity(&title) else {
                continue;
            };
            // Strictly greater keeps the earlier declaration on ties.
            if best.is_none_or(|(_, current)| specificity > current) {
                best = Some((compiled.definition, specificity));
            }
        }

        match best {
            Some((definition, _)) => MatchOutcome::Matched(definition),
            None => MatchOutcome::NoMatch,
        }
    }

    pub fn find(&self, title: &str) -> Option<&'a ProductDefinition> {
        self.classify(title).product()
    }
}

impl CompiledDefinition<'_> {
    /// `(pattern count, summed length of the longest matching alternative)`,
    /// or `None` when some pattern has no alternative in the title.
    fn specificity(&self, title: &str) -> Option<(usize, usize)> {
        let mut length = 0;
        for alternatives in &self.patterns {
            let matched = alternatives
                .iter()
                .filter(|alt| title.contains(alt.as_str()))
                .map(|alt| alt.len())
                .max()?;
            length += matched;
        }
        Some((self.patterns.len(), length))
    }
}

fn compile_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| normalize_title(k))
        .filter(|k| !k.is_empty())
        .collect()
}

/// Matches a single offer against the catalog.
pub fn match_offer<'a>(offer: &RawOffer, catalog: &'a ProductCatalog) -> Option<&'a ProductDefinition> {
    Matcher::new(catalog).find(&offer.title)
}
