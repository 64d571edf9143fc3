use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use regex::Regex;

use crate::model::{Listing, Variation};

const TITLE_TEMPLATES: &[&str] = &[
    "{name} - {price}",
    "{name} | {price}",
    "Vendo {name} - {price}",
    "Se vende {name} por {price}",
    "{name} - Precio: {price}",
    "¡{name}! Solo {price}",
    "{name} ({price})",
    "Oferta: {name} - {price}",
    "{name} disponible por {price}",
    "Aprovecha: {name} - {price}",
];

const DESCRIPTION_PREFIXES: &[&str] = &[
    "Excelente oportunidad:",
    "Gran oferta:",
    "No te pierdas:",
    "Aprovecha esta ocasión:",
    "Oferta especial:",
    "Disponible ahora:",
    "Última oportunidad:",
    "Para venta:",
    "Se ofrece:",
    "En oferta:",
];

const DESCRIPTION_SUFFIXES: &[&str] = &[
    "Contacta para más detalles.",
    "Precio negociable.",
    "Entrega inmediata.",
    "Solo efectivo.",
    "Primera calidad.",
    "En excelente estado.",
    "No dejes pasar esta oportunidad.",
    "Precio fijo.",
    "Entrega a domicilio.",
    "Garantía incluida.",
];

const TRANSITIONS: &[&str] = &[
    "Además,",
    "También,",
    "Por otro lado,",
    "Incluye",
    "Características:",
    "Detalles importantes:",
    "Información adicional:",
    "Ten en cuenta que",
    "Es importante mencionar que",
    "Cabe destacar que",
];

const CALLS_TO_ACTION: &[&str] = &[
    "Contáctame ya!",
    "No esperes más!",
    "Llama ahora!",
    "Escríbeme pronto!",
    "Aprovecha la oferta!",
    "Primera llamada se lo lleva!",
    "Pregunta sin compromiso!",
    "Interesados contactar!",
    "Solo llamadas serias!",
    "WhatsApp disponible!",
];

const LOCATION_PHRASES: &[&str] = &[
    "Ubicado en {location}",
    "Disponible en {location}",
    "Se encuentra en {location}",
    "Para entrega en {location}",
    "Zona: {location}",
    "Área: {location}",
    "Municipio: {location}",
    "En {location}",
    "Desde {location}",
    "Localizado en {location}",
];

const SYNONYMS: &[(&str, &[&str])] = &[
    (
        "excelente",
        &["magnífico", "extraordinario", "fantástico", "estupendo", "genial"],
    ),
    ("bueno", &["bien", "correcto", "adecuado", "apropiado", "óptimo"]),
    ("nuevo", &["reciente", "flamante", "moderno", "actual", "fresco"]),
    (
        "usado",
        &["de segunda mano", "seminuevo", "de ocasión", "pre-owned"],
    ),
    ("precio", &["costo", "valor", "importe", "tarifa"]),
    (
        "vendo",
        &["ofrezco", "comercializo", "pongo en venta", "tengo disponible"],
    ),
    (
        "disponible",
        &["libre", "accesible", "a la mano", "en stock", "en existencia"],
    ),
];

const CATEGORY_FILLERS: &[(&[&str], &[&str])] = &[
    (
        &["auto", "carro", "vehiculo", "vehículo"],
        &[
            "motor en perfecto estado",
            "papeles al día",
            "mantenimiento reciente",
            "aire acondicionado",
            "transmisión automática",
        ],
    ),
    (
        &["casa", "apartamento", "vivienda"],
        &[
            "excelente ubicación",
            "cerca del transporte",
            "zona tranquila",
            "todos los servicios",
            "acceso fácil",
        ],
    ),
    (
        &["telefono", "teléfono", "celular", "movil", "móvil"],
        &[
            "batería dura todo el día",
            "pantalla perfecta",
            "sin rayones",
            "con cargador original",
            "liberado de fábrica",
        ],
    ),
    (
        &["ropa", "zapato", "accesorio"],
        &[
            "talla perfecta",
            "como nuevo",
            "marca reconocida",
            "muy cómodo",
            "estilo moderno",
        ],
    ),
];

const CATEGORY_EMOJIS: &[(&str, &[&str])] = &[
    ("auto", &["🚗", "🚙", "🚘"]),
    ("casa", &["🏠", "🏡", "🏘️"]),
    ("telefono", &["📱", "📞", "☎️"]),
    ("ropa", &["👕", "👔", "👗"]),
    ("zapato", &["👟", "👠", "👞"]),
    ("comida", &["🍕", "🍔", "🥘"]),
    ("electronico", &["💻", "📺", "🔌"]),
    ("mueble", &["🪑", "🛏️", "🗄️"]),
];

const DEFAULT_EMOJIS: &[&str] = &["⭐", "✨", "🎯", "🔥", "💎"];

/// How many listing/minute keys the repeat guard remembers before it is
/// wiped and starts over.
const RECENCY_CAP: usize = 1000;

/// Produces randomized, semantically-equivalent rewrites of listing copy.
/// Output is never persisted; the only internal state is a bounded recency
/// map used to keep consecutive rewrites of the same listing from being
/// byte-identical.
pub struct VariationEngine {
    rng: ChaCha8Rng,
    synonyms: Vec<(Regex, &'static [&'static str])>,
    recent: HashMap<String, u64>,
}

impl Default for VariationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl VariationEngine {
    pub fn new() -> Self {
        Self::from_rng(ChaCha8Rng::from_entropy())
    }

    /// Deterministic engine for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn from_rng(rng: ChaCha8Rng) -> Self {
        let synonyms = SYNONYMS
            .iter()
            .filter_map(|(word, options)| {
                Regex::new(&format!(r"(?i)\b{word}\b"))
                    .ok()
                    .map(|re| (re, *options))
            })
            .collect();
        Self {
            rng,
            synonyms,
            recent: HashMap::new(),
        }
    }

    /// Always returns non-empty copy for a listing with non-empty
    /// name/description. Degrades to the raw listing text when a catalogue
    /// is unusable; the returned variation carries the `fallback` flag so
    /// the caller can log it.
    pub fn generate(&mut self, listing: &Listing) -> Variation {
        let Some((title, description)) = self.compose(listing) else {
            return fallback(listing);
        };

        let minute = Utc::now().timestamp() / 60;
        let key = recency_key(listing, minute);
        let previous_key = recency_key(listing, minute - 1);

        let mut title = title;
        let hash = pair_hash(&title, &description);
        let last_seen = self
            .recent
            .get(&key)
            .or_else(|| self.recent.get(&previous_key));
        if last_seen == Some(&hash) {
            title = toggle_punctuation(title);
        }

        if self.recent.len() >= RECENCY_CAP {
            self.recent.clear();
        }
        self.recent.insert(key, pair_hash(&title, &description));

        Variation {
            title,
            description,
            fallback: false,
        }
    }

    fn compose(&mut self, listing: &Listing) -> Option<(String, String)> {
        let title = self.compose_title(listing)?;
        let description = self.compose_description(listing)?;
        if title.trim().is_empty() || description.trim().is_empty() {
            return None;
        }
        Some((title, description))
    }

    fn compose_title(&mut self, listing: &Listing) -> Option<String> {
        let template = *TITLE_TEMPLATES.choose(&mut self.rng)?;
        let price = self.format_price(listing);
        let mut title = template
            .replace("{name}", listing.name.trim())
            .replace("{price}", &price);
        if self.rng.gen_bool(0.3) {
            if let Some(emoji) = self.category_emoji(&listing.category) {
                title = format!("{emoji} {title}");
            }
        }
        Some(title)
    }

    fn compose_description(&mut self, listing: &Listing) -> Option<String> {
        let base = if listing.description.trim().is_empty() {
            listing.name.trim()
        } else {
            listing.description.trim()
        };
        let mut description = base.to_string();

        if self.rng.gen_bool(0.4) {
            if let Some(prefix) = DESCRIPTION_PREFIXES.choose(&mut self.rng) {
                description = format!("{prefix} {description}");
            }
        }

        description = self.apply_synonyms(description);

        if let Some(filler) = self.category_filler(&listing.category) {
            if let Some(transition) = TRANSITIONS.choose(&mut self.rng) {
                description.push_str(&format!(" {transition} {filler}"));
            }
        }

        if !listing.location.trim().is_empty() && self.rng.gen_bool(0.5) {
            if let Some(phrase) = LOCATION_PHRASES.choose(&mut self.rng) {
                let phrase = phrase.replace("{location}", listing.location.trim());
                description.push_str(&format!(" {phrase}."));
            }
        }

        if self.rng.gen_bool(0.6) {
            if let Some(cta) = CALLS_TO_ACTION.choose(&mut self.rng) {
                description.push_str(&format!(" {cta}"));
            }
        }

        if self.rng.gen_bool(0.5) {
            if let Some(suffix) = DESCRIPTION_SUFFIXES.choose(&mut self.rng) {
                description.push_str(&format!(" {suffix}"));
            }
        }

        Some(description.trim().to_string())
    }

    fn apply_synonyms(&mut self, text: String) -> String {
        let Self { rng, synonyms, .. } = self;
        let mut result = text;
        for (re, options) in synonyms.iter() {
            if re.is_match(&result) && rng.gen_bool(0.4) {
                if let Some(synonym) = options.choose(rng) {
                    result = re.replace_all(&result, *synonym).into_owned();
                }
            }
        }
        result
    }

    fn format_price(&mut self, listing: &Listing) -> String {
        let Some(amount) = listing.price.amount else {
            return "Precio a consultar".to_string();
        };
        let amount = if amount.fract() == 0.0 {
            format!("{:.0}", amount)
        } else {
            format!("{}", amount)
        };
        let currency = if listing.price.currency.trim().is_empty() {
            "CUP"
        } else {
            listing.price.currency.trim()
        };
        let formats = [
            format!("${amount}"),
            format!("{amount} {currency}"),
            format!("${amount} {currency}"),
            format!("Precio: ${amount}"),
            format!("{amount}$"),
        ];
        formats
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| format!("${amount}"))
    }

    fn category_filler(&mut self, category: &str) -> Option<&'static str> {
        let category = category.to_lowercase();
        let Self { rng, .. } = self;
        for (keys, fillers) in CATEGORY_FILLERS {
            if keys.iter().any(|key| category.contains(key)) {
                return fillers.choose(rng).copied();
            }
        }
        None
    }

    fn category_emoji(&mut self, category: &str) -> Option<&'static str> {
        let category = category.to_lowercase();
        let Self { rng, .. } = self;
        let pool = CATEGORY_EMOJIS
            .iter()
            .find(|(key, _)| category.contains(key))
            .map(|(_, emojis)| *emojis)
            .unwrap_or(DEFAULT_EMOJIS);
        pool.choose(rng).copied()
    }

    pub fn recency_entries(&self) -> usize {
        self.recent.len()
    }
}

fn recency_key(listing: &Listing, minute: i64) -> String {
    format!("{}:{minute}", listing.row)
}

fn pair_hash(title: &str, description: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    title.hash(&mut hasher);
    description.hash(&mut hasher);
    hasher.finish()
}

fn toggle_punctuation(title: String) -> String {
    let trimmed = title.trim_end().to_string();
    if let Some(stripped) = trimmed.strip_suffix('!') {
        format!("{stripped}.")
    } else if let Some(stripped) = trimmed.strip_suffix('.') {
        format!("{stripped}!")
    } else {
        format!("{trimmed}!")
    }
}

fn fallback(listing: &Listing) -> Variation {
    let title = if listing.name.trim().is_empty() {
        "Anuncio".to_string()
    } else {
        listing.name.trim().to_string()
    };
    let description = if listing.description.trim().is_empty() {
        title.clone()
    } else {
        listing.description.trim().to_string()
    };
    Variation {
        title,
        description,
        fallback: true,
    }
}
