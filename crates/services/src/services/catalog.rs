//! Production sites, their brands and products, and the technical-info form
//! that selects the brand a sample session works on.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

const REPORT_TITLE_PREFIX: &str = "Formulaire contrôle microbiologique";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Site {
    pub id: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Brand {
    pub id: &'static str,
    pub name: &'static str,
    pub products: &'static [&'static str],
}

pub const SITES: &[Site] = &[
    Site { id: "R1", name: "Laiterie Collet (R1)" },
    Site { id: "R2", name: "Végétal Santé (R2)" },
    Site { id: "BAIKO", name: "Laiterie Baiko" },
];

const R1_BRANDS: &[Brand] = &[
    Brand { id: "grand_frais", name: "Grand Frais", products: &["Crème dessert"] },
    Brand { id: "faisselle", name: "Faisselle", products: &["Faisselle nature"] },
    Brand {
        id: "dessert_vegetal",
        name: "Dessert végétal non fermenté",
        products: &["Dessert végétal"],
    },
    Brand { id: "simba", name: "SIMBA", products: &["Produit SIMBA"] },
    Brand {
        id: "creme_dessert_collet",
        name: "Crème dessert Collet",
        products: &["Crème dessert vanille", "Crème dessert chocolat"],
    },
    Brand { id: "lait", name: "Lait", products: &["Lait"] },
    Brand { id: "materiel", name: "Matériel", products: &["Matériel"] },
    Brand { id: "eau_rincage_r1", name: "Eau de rinçage", products: &["Eau de rinçage"] },
    Brand { id: "solato", name: "Solato", products: &["Produit Solato"] },
];

const R2_BRANDS: &[Brand] = &[
    Brand { id: "tcc", name: "TCC", products: &["Produit TCC"] },
    Brand { id: "abbott_kinney", name: "Abbott Kinney", products: &["Produit Abbott Kinney"] },
    Brand {
        id: "dessy",
        name: "Dessy",
        products: &[
            "L'Atelier Dessy Mangue Passion",
            "L'Atelier Dessy Nature",
            "L'Atelier Dessy Caramel Salé et Chocolat noir",
            "L'Atelier Dessy Framboise Mure",
        ],
    },
    Brand { id: "amorcage_debut_prod", name: "Amorçage début prod", products: &["Amorçage"] },
    Brand { id: "yoplait", name: "Yoplait", products: &["Produit Yoplait"] },
    Brand { id: "milsani", name: "Milsani", products: &["Produit Milsani"] },
    Brand { id: "envia", name: "Envia", products: &["Produit Envia"] },
    Brand { id: "heaven", name: "Heaven", products: &["Produit Heaven"] },
    Brand { id: "eau_rincage_r2", name: "Eau de rinçage", products: &["Eau de rinçage"] },
];

const BAIKO_BRANDS: &[Brand] = &[
    Brand { id: "yaourts", name: "Yaourts", products: &["Yaourt nature", "Yaourt aux fruits"] },
    Brand {
        id: "prepa_fruit",
        name: "Prépa fruit",
        products: &[
            "Préparation fruit fraise",
            "Préparation fruit mangue passion",
            "Préparation fruit poire",
        ],
    },
    Brand { id: "lait_cru", name: "Lait cru/pasto", products: &["Lait cru", "Lait pasteurisé"] },
    Brand { id: "eau_rincage_baiko", name: "Eau de rinçage", products: &["Eau de rinçage"] },
];

pub fn site(id: &str) -> Option<&'static Site> {
    SITES.iter().find(|site| site.id == id)
}

/// Brands produced on a site; empty for an unknown site.
pub fn brands_for_site(site_id: &str) -> &'static [Brand] {
    match site_id {
        "R1" => R1_BRANDS,
        "R2" => R2_BRANDS,
        "BAIKO" => BAIKO_BRANDS,
        _ => &[],
    }
}

pub fn report_title(brand: &Brand) -> String {
    format!("{REPORT_TITLE_PREFIX} – {}", brand.name)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TechnicalInfoError {
    #[error("a brand must be selected")]
    BrandRequired,
    #[error("brand {brand} is not produced on site {site}")]
    UnknownBrand { site: String, brand: String },
    #[error("no site selected")]
    SiteRequired,
}

/// Everything the sample entry page needs once the technical info is validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct SampleEntryContext {
    pub brand: String,
    pub report_title: String,
    pub site: String,
    pub sample_date: String,
    pub reference: String,
    pub products: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TechnicalInfoForm {
    site: Option<String>,
    analysis_date: Option<NaiveDate>,
    brands: &'static [Brand],
    brand: Option<&'static Brand>,
}

impl TechnicalInfoForm {
    pub fn new(site: Option<&str>, analysis_date: Option<NaiveDate>) -> Self {
        let brands = site.map(brands_for_site).unwrap_or(&[]);
        let site = site.filter(|_| !brands.is_empty()).map(str::to_string);
        // A site with a single brand needs no choice.
        let brand = match brands {
            [only] => Some(only),
            _ => None,
        };
        Self {
            site,
            analysis_date,
            brands,
            brand,
        }
    }

    pub fn available_brands(&self) -> &'static [Brand] {
        self.brands
    }

    pub fn selected_brand(&self) -> Option<&'static Brand> {
        self.brand
    }

    pub fn select_brand(&mut self, brand_id: &str) -> Result<(), TechnicalInfoError> {
        let brand = self.brands.iter().find(|brand| brand.id == brand_id).ok_or_else(|| {
            TechnicalInfoError::UnknownBrand {
                site: self.site.clone().unwrap_or_default(),
                brand: brand_id.to_string(),
            }
        })?;
        self.brand = Some(brand);
        Ok(())
    }

    /// Empty until a brand is selected.
    pub fn report_title(&self) -> String {
        self.brand.map(report_title).unwrap_or_default()
    }

    pub fn submit(&self, now: DateTime<Utc>) -> Result<SampleEntryContext, TechnicalInfoError> {
        let brand = self.brand.ok_or(TechnicalInfoError::BrandRequired)?;
        let site = self.site.clone().ok_or(TechnicalInfoError::SiteRequired)?;

        Ok(SampleEntryContext {
            brand: brand.id.to_string(),
            report_title: report_title(brand),
            reference: reference(&site, now),
            site,
            sample_date: self
                .analysis_date
                .map(|date| date.format("%d/%m/%Y").to_string())
                .unwrap_or_default(),
            products: brand.products.iter().map(|p| p.to_string()).collect(),
        })
    }
}

/// `REF-<site>-<millis>` keeping only the low-order digits of the timestamp.
fn reference(site: &str, now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().to_string();
    format!("REF-{site}-{}", millis.get(8..).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_sites_and_brands() {
        assert_eq!(SITES.len(), 3);
        assert_eq!(site("BAIKO").map(|s| s.name), Some("Laiterie Baiko"));
        assert_eq!(brands_for_site("R1").len(), 9);
        assert_eq!(brands_for_site("R2").len(), 9);
        assert_eq!(brands_for_site("BAIKO").len(), 4);
        assert!(brands_for_site("R9").is_empty());
    }

    #[test]
    fn test_unknown_site_offers_nothing() {
        let form = TechnicalInfoForm::new(Some("R9"), None);
        assert!(form.available_brands().is_empty());
        assert_eq!(form.report_title(), "");
    }

    #[test]
    fn test_submit_requires_brand() {
        let form = TechnicalInfoForm::new(Some("R1"), None);
        assert_eq!(form.submit(Utc::now()), Err(TechnicalInfoError::BrandRequired));
    }

    #[test]
    fn test_select_brand_rejects_other_sites() {
        let mut form = TechnicalInfoForm::new(Some("R1"), None);
        let err = form.select_brand("yoplait").unwrap_err();
        assert!(matches!(err, TechnicalInfoError::UnknownBrand { .. }));
        assert!(form.selected_brand().is_none());
    }

    #[test]
    fn test_submit_builds_entry_context() {
        let mut form = TechnicalInfoForm::new(
            Some("R2"),
            NaiveDate::from_ymd_opt(2025, 5, 2),
        );
        form.select_brand("dessy").unwrap();
        assert_eq!(form.report_title(), "Formulaire contrôle microbiologique – Dessy");

        let now = Utc.timestamp_millis_opt(1_746_172_800_123).unwrap();
        let context = form.submit(now).unwrap();
        assert_eq!(context.brand, "dessy");
        assert_eq!(context.site, "R2");
        assert_eq!(context.sample_date, "02/05/2025");
        assert_eq!(context.reference, "REF-R2-00123");
        assert_eq!(context.products.len(), 4);
        assert_eq!(context.products[0], "L'Atelier Dessy Mangue Passion");
    }

    #[test]
    fn test_reference_without_date_leaves_sample_date_empty() {
        let mut form = TechnicalInfoForm::new(Some("BAIKO"), None);
        form.select_brand("lait_cru").unwrap();
        let context = form.submit(Utc::now()).unwrap();
        assert!(context.sample_date.is_empty());
        assert!(context.reference.starts_with("REF-BAIKO-"));
    }
}
