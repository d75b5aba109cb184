//! Parameter name patterns.
//!
//! A selector is written `name` or `name[group, group, ...]`. Both the name and the
//! group entries may use `*` (any run of characters) and `?` (one character).
//! Qualifiers a selector leaves unset match any value, so `dw_ab` selects the
//! `dw_ab` class of every group.

use std::fmt;

use crate::domain::{ParamName, Qualifier};

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSelector {
    /// Name pattern (lower case).
    pub name: String,
    /// Group patterns (upper case); `None` matches grouped and ungrouped classes.
    pub groups: Option<Vec<String>>,
    pub temperature: Option<Qualifier>,
    pub b0: Option<Qualifier>,
}

impl ParamSelector {
    /// Selector on the name only.
    pub fn name(pattern: &str) -> Self {
        Self {
            name: pattern.trim().to_lowercase(),
            groups: None,
            temperature: None,
            b0: None,
        }
    }

    /// Parse `name` or `name[g1, g2]`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let (name, groups) = match text.find('[') {
            Some(open) => {
                let Some(inner) = text[open + 1..].strip_suffix(']') else {
                    return Err(format!("unterminated group list in selector '{text}'"));
                };
                let groups: Vec<String> = inner
                    .split(',')
                    .map(|g| g.trim().to_uppercase())
                    .filter(|g| !g.is_empty())
                    .collect();
                if groups.is_empty() {
                    return Err(format!("empty group list in selector '{text}'"));
                }
                (&text[..open], Some(groups))
            }
            None => (text, None),
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(format!("selector '{text}' has no parameter name"));
        }
        if name.contains(']') {
            return Err(format!("unexpected ']' in selector '{text}'"));
        }

        Ok(Self {
            groups,
            ..Self::name(name)
        })
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = Some(groups.into_iter().map(|g| g.trim().to_uppercase()).collect());
        self
    }

    pub fn matches(&self, param: &ParamName) -> bool {
        if !wildcard_match(&self.name, &param.name) {
            return false;
        }
        if let Some(patterns) = &self.groups {
            let Some(group) = &param.group else {
                return false;
            };
            if !patterns.iter().any(|p| wildcard_match(p, group.as_str())) {
                return false;
            }
        }
        if self.temperature.is_some() && self.temperature != param.temperature {
            return false;
        }
        if self.b0.is_some() && self.b0 != param.b0 {
            return false;
        }
        true
    }

    /// The concrete class this selector names, when it contains no wildcard and at
    /// most one group.
    pub fn exact_name(&self) -> Option<ParamName> {
        if has_wildcard(&self.name) {
            return None;
        }
        let group = match &self.groups {
            None => None,
            Some(groups) if groups.len() == 1 && !has_wildcard(&groups[0]) => {
                Some(groups[0].as_str().into())
            }
            Some(_) => return None,
        };
        Some(ParamName {
            name: self.name.clone(),
            group,
            temperature: self.temperature,
            b0: self.b0,
        })
    }
}

impl fmt::Display for ParamSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(groups) = &self.groups {
            write!(f, "[{}]", groups.join(","))?;
        }
        if let Some(b0) = self.b0 {
            write!(f, ", B0->{b0}MHz")?;
        }
        if let Some(t) = self.temperature {
            write!(f, ", T->{t}C")?;
        }
        Ok(())
    }
}

fn has_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Glob-style match supporting `*` and `?`.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    // Position of the last `*` and the text index it is currently absorbing up to.
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
