//! Requirement catalog
//!
//! Static lookup from (category, sub-category) to the ordered list of
//! documents an applicant must provide, plus free-text normalization of the
//! labels the messaging channel sends back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Keys
// ============================================================================

/// Loan purpose chosen by the applicant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Housing,
    Vehicle,
    Personal,
    Education,
    Business,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Housing,
        Category::Vehicle,
        Category::Personal,
        Category::Education,
        Category::Business,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Housing => "housing",
            Category::Vehicle => "vehicle",
            Category::Personal => "personal",
            Category::Education => "education",
            Category::Business => "business",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Category::Housing => "Home Loan",
            Category::Vehicle => "Vehicle Loan",
            Category::Personal => "Personal Loan",
            Category::Education => "Education Loan",
            Category::Business => "Business Loan",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::Housing => "Buy, build or renovate a home",
            Category::Vehicle => "Car, bike or commercial vehicle",
            Category::Personal => "Medical, travel, wedding and other needs",
            Category::Education => "Tuition and study abroad",
            Category::Business => "Working capital and expansion",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

/// Employment profile of the applicant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubCategory {
    Salaried,
    SelfEmployed,
}

impl SubCategory {
    pub const ALL: [SubCategory; 2] = [SubCategory::Salaried, SubCategory::SelfEmployed];

    pub fn key(self) -> &'static str {
        match self {
            SubCategory::Salaried => "salaried",
            SubCategory::SelfEmployed => "self_employed",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SubCategory::Salaried => "Salaried",
            SubCategory::SelfEmployed => "Self-Employed",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SubCategory::Salaried => "Employed with a regular monthly salary",
            SubCategory::SelfEmployed => "Business owner, professional or freelancer",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }
}

/// One selectable entry shown to the applicant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogOption {
    pub key: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
}

// ============================================================================
// Normalization rules
// ============================================================================

/// How a rule pattern is matched against normalized input
#[derive(Debug, Clone, Copy)]
enum Pattern {
    /// Matches a whole word of the input
    Word(&'static str),
    /// Matches anywhere in the input, including inside words
    Fragment(&'static str),
}

impl Pattern {
    fn matches(self, normalized: &str, words: &[&str]) -> bool {
        match self {
            Pattern::Word(word) => words.contains(&word),
            Pattern::Fragment(fragment) => normalized.contains(fragment),
        }
    }
}

struct Rule<K: 'static> {
    key: K,
    patterns: &'static [Pattern],
}

// Evaluated top to bottom; the first rule with a matching pattern wins.
// Education precedes vehicle so "career course" is not read as "car".
const CATEGORY_RULES: &[Rule<Category>] = &[
    Rule {
        key: Category::Education,
        patterns: &[
            Pattern::Fragment("educat"),
            Pattern::Fragment("study"),
            Pattern::Fragment("studies"),
            Pattern::Fragment("college"),
            Pattern::Fragment("universit"),
            Pattern::Fragment("tuition"),
            Pattern::Word("course"),
            Pattern::Word("school"),
        ],
    },
    Rule {
        key: Category::Housing,
        patterns: &[
            Pattern::Word("home"),
            Pattern::Fragment("housing"),
            Pattern::Word("house"),
            Pattern::Fragment("property"),
            Pattern::Word("flat"),
            Pattern::Fragment("apartment"),
            Pattern::Fragment("mortgage"),
        ],
    },
    Rule {
        key: Category::Vehicle,
        patterns: &[
            Pattern::Fragment("vehicle"),
            Pattern::Word("car"),
            Pattern::Word("bike"),
            Pattern::Fragment("motorbike"),
            Pattern::Fragment("scooter"),
            Pattern::Word("auto"),
            Pattern::Fragment("two wheeler"),
            Pattern::Word("truck"),
        ],
    },
    Rule {
        key: Category::Business,
        patterns: &[
            Pattern::Fragment("business"),
            Pattern::Word("shop"),
            Pattern::Word("msme"),
            Pattern::Fragment("working capital"),
            Pattern::Word("company"),
            Pattern::Word("startup"),
        ],
    },
    Rule {
        key: Category::Personal,
        patterns: &[
            Pattern::Fragment("personal"),
            Pattern::Fragment("medical"),
            Pattern::Fragment("wedding"),
            Pattern::Fragment("travel"),
            Pattern::Word("emergency"),
        ],
    },
];

// Independent-style rules must run first: "self-employed" also contains "employ".
const SUBCATEGORY_RULES: &[Rule<SubCategory>] = &[
    Rule {
        key: SubCategory::SelfEmployed,
        patterns: &[
            Pattern::Fragment("self"),
            Pattern::Fragment("freelanc"),
            Pattern::Fragment("own business"),
            Pattern::Fragment("my business"),
            Pattern::Fragment("business owner"),
            Pattern::Fragment("proprietor"),
            Pattern::Fragment("consultant"),
            Pattern::Fragment("independent"),
            Pattern::Word("professional"),
        ],
    },
    Rule {
        key: SubCategory::Salaried,
        patterns: &[
            Pattern::Fragment("salar"),
            Pattern::Word("job"),
            Pattern::Fragment("employ"),
            Pattern::Word("service"),
            Pattern::Fragment("payroll"),
            Pattern::Fragment("monthly pay"),
        ],
    },
];

/// Lower-case, trim, and fold `_`/`-` and repeated whitespace to single spaces
fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn apply_rules<K: Copy>(rules: &[Rule<K>], normalized: &str) -> Option<K> {
    let words: Vec<&str> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    rules
        .iter()
        .find(|rule| rule.patterns.iter().any(|p| p.matches(normalized, &words)))
        .map(|rule| rule.key)
}

// ============================================================================
// Item table
// ============================================================================

const IDENTITY: &str = "Identity Proof";
const ADDRESS: &str = "Address Proof";
const PAN: &str = "PAN Card";
const SALARY_SLIPS: &str = "Salary Slips";
const BANK_STATEMENTS: &str = "Bank Statements";
const FORM_16: &str = "Form 16";
const PROPERTY: &str = "Property Documents";
const ITR: &str = "ITR Returns";
const BUSINESS_PROOF: &str = "Business Proof";
const FINANCIALS: &str = "Financial Statements";
const VEHICLE_QUOTE: &str = "Vehicle Quotation";
const PHOTO: &str = "Passport Photo";
const ADMISSION: &str = "Admission Letter";
const FEES: &str = "Fee Structure";
const CO_APPLICANT: &str = "Co-applicant KYC";
const GST: &str = "GST Registration";
const BUSINESS_PLAN: &str = "Business Plan";

/// The exhaustive match keeps every (category, sub-category) pair covered.
fn standard_items(category: Category, sub_category: SubCategory) -> &'static [&'static str] {
    use Category as C;
    use SubCategory as S;
    match (category, sub_category) {
        (C::Housing, S::Salaried) => &[
            IDENTITY,
            ADDRESS,
            PAN,
            SALARY_SLIPS,
            BANK_STATEMENTS,
            FORM_16,
            PROPERTY,
        ],
        (C::Housing, S::SelfEmployed) => &[
            IDENTITY,
            ADDRESS,
            PAN,
            ITR,
            BANK_STATEMENTS,
            BUSINESS_PROOF,
            FINANCIALS,
            PROPERTY,
        ],
        (C::Vehicle, S::Salaried) => &[
            IDENTITY,
            ADDRESS,
            PAN,
            SALARY_SLIPS,
            BANK_STATEMENTS,
            VEHICLE_QUOTE,
        ],
        (C::Vehicle, S::SelfEmployed) => &[
            IDENTITY,
            ADDRESS,
            PAN,
            ITR,
            BANK_STATEMENTS,
            BUSINESS_PROOF,
            VEHICLE_QUOTE,
        ],
        (C::Personal, S::Salaried) => &[IDENTITY, ADDRESS, PAN, SALARY_SLIPS, BANK_STATEMENTS, PHOTO],
        (C::Personal, S::SelfEmployed) => &[
            IDENTITY,
            ADDRESS,
            PAN,
            ITR,
            BANK_STATEMENTS,
            BUSINESS_PROOF,
            PHOTO,
        ],
        (C::Education, S::Salaried) => &[
            IDENTITY,
            ADDRESS,
            ADMISSION,
            FEES,
            CO_APPLICANT,
            SALARY_SLIPS,
            BANK_STATEMENTS,
        ],
        (C::Education, S::SelfEmployed) => &[
            IDENTITY,
            ADDRESS,
            ADMISSION,
            FEES,
            CO_APPLICANT,
            ITR,
            BANK_STATEMENTS,
        ],
        (C::Business, S::Salaried) => &[
            IDENTITY,
            ADDRESS,
            PAN,
            SALARY_SLIPS,
            BANK_STATEMENTS,
            BUSINESS_PLAN,
        ],
        (C::Business, S::SelfEmployed) => &[
            IDENTITY,
            ADDRESS,
            PAN,
            GST,
            BUSINESS_PROOF,
            ITR,
            FINANCIALS,
            BANK_STATEMENTS,
        ],
    }
}

const DESCRIPTIONS: &[(&str, &str)] = &[
    (IDENTITY, "Aadhaar card, passport, voter ID or driving licence"),
    (ADDRESS, "Utility bill, rental agreement or passport address page"),
    (PAN, "Clear photo or scan of your PAN card"),
    (SALARY_SLIPS, "Salary slips for the last 3 months"),
    (BANK_STATEMENTS, "Bank statements for the last 6 months"),
    (FORM_16, "Form 16 for the last 2 financial years"),
    (PROPERTY, "Sale agreement, allotment letter or title deed of the property"),
    (ITR, "Income tax returns for the last 2 years"),
    (BUSINESS_PROOF, "Shop licence, registration certificate or partnership deed"),
    (FINANCIALS, "Audited profit & loss statement and balance sheet"),
    (VEHICLE_QUOTE, "Proforma invoice or quotation from the dealer"),
    (PHOTO, "A recent passport-size photograph"),
    (ADMISSION, "Admission or offer letter from the institution"),
    (FEES, "Fee schedule issued by the institution"),
    (CO_APPLICANT, "Identity and address proof of the co-applicant"),
    (GST, "GST registration certificate"),
    (BUSINESS_PLAN, "Short business plan with expected costs"),
];

// ============================================================================
// Catalog
// ============================================================================

/// Immutable requirement catalog, built once at startup and shared by reference
#[derive(Debug, Clone)]
pub struct Catalog {
    items: HashMap<(Category, SubCategory), Vec<String>>,
    descriptions: HashMap<String, String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl Catalog {
    /// The production document table
    pub fn standard() -> Self {
        let items = Category::ALL
            .into_iter()
            .flat_map(|c| SubCategory::ALL.into_iter().map(move |s| (c, s)))
            .map(|(c, s)| {
                let list = standard_items(c, s).iter().map(|i| (*i).to_string()).collect();
                ((c, s), list)
            })
            .collect();

        let descriptions = DESCRIPTIONS
            .iter()
            .map(|(item, text)| ((*item).to_string(), (*text).to_string()))
            .collect();

        Self { items, descriptions }
    }

    /// Replace the item list for one pair (used to stage catalog changes)
    #[allow(dead_code)] // Used in tests
    pub fn with_items(
        mut self,
        category: Category,
        sub_category: SubCategory,
        items: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.items
            .insert((category, sub_category), items.into_iter().map(Into::into).collect());
        self
    }

    pub fn list_categories(&self) -> Vec<CatalogOption> {
        Category::ALL
            .into_iter()
            .map(|c| CatalogOption {
                key: c.key(),
                display_name: c.display_name(),
                description: c.description(),
            })
            .collect()
    }

    pub fn list_subcategories(&self) -> Vec<CatalogOption> {
        SubCategory::ALL
            .into_iter()
            .map(|s| CatalogOption {
                key: s.key(),
                display_name: s.display_name(),
                description: s.description(),
            })
            .collect()
    }

    /// Map a key, label or free-text phrase to a category
    pub fn normalize_category(&self, text: &str) -> Option<Category> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return None;
        }
        Category::ALL
            .into_iter()
            .find(|c| {
                normalized == normalize_text(c.key()) || normalized == normalize_text(c.display_name())
            })
            .or_else(|| apply_rules(CATEGORY_RULES, &normalized))
    }

    /// Map a key, label or free-text phrase to a sub-category
    pub fn normalize_subcategory(&self, text: &str) -> Option<SubCategory> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return None;
        }
        SubCategory::ALL
            .into_iter()
            .find(|s| {
                normalized == normalize_text(s.key()) || normalized == normalize_text(s.display_name())
            })
            .or_else(|| apply_rules(SUBCATEGORY_RULES, &normalized))
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_valid_category(&self, text: &str) -> bool {
        self.normalize_category(text).is_some()
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_valid_subcategory(&self, text: &str) -> bool {
        self.normalize_subcategory(text).is_some()
    }

    /// Ordered required items, or `None` if the pair is missing from the table
    pub fn required_items(&self, category: Category, sub_category: SubCategory) -> Option<Vec<String>> {
        self.items.get(&(category, sub_category)).cloned()
    }

    /// Curated description of an item, or a generic upload request
    pub fn describe(&self, item_name: &str) -> String {
        self.descriptions
            .get(item_name)
            .cloned()
            .unwrap_or_else(|| format!("Please upload your {item_name}"))
    }
}
