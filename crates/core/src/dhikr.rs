use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DhikrEntry {
    pub arabic_text: String,
    pub transliteration: String,
    pub translated_text: String,
    pub reward_text: String,
}

impl DhikrEntry {
    fn new(arabic: &str, transliteration: &str, translated: &str, reward: &str) -> Self {
        Self {
            arabic_text: arabic.to_string(),
            transliteration: transliteration.to_string(),
            translated_text: translated.to_string(),
            reward_text: reward.to_string(),
        }
    }

    pub fn notification_body(&self) -> String {
        format!("{}\n{}", self.arabic_text, self.translated_text)
    }
}

#[derive(Debug, Clone)]
pub struct DhikrCatalog {
    entries: Vec<DhikrEntry>,
}

impl DhikrCatalog {
    pub fn new(entries: Vec<DhikrEntry>) -> Self {
        if entries.is_empty() {
            return Self::builtin();
        }
        Self { entries }
    }

    pub fn builtin() -> Self {
        let entries = vec![
            DhikrEntry::new(
                "سُبْحَانَ اللَّهِ",
                "SubhanAllah",
                "Glory be to Allah",
                "A tree is planted for you in Paradise",
            ),
            DhikrEntry::new(
                "الْحَمْدُ لِلَّهِ",
                "Alhamdulillah",
                "All praise is due to Allah",
                "Fills the scales of good deeds",
            ),
            DhikrEntry::new(
                "اللَّهُ أَكْبَرُ",
                "Allahu Akbar",
                "Allah is the Greatest",
                "Beloved to Allah above all that the sun rises upon",
            ),
            DhikrEntry::new(
                "لَا إِلَٰهَ إِلَّا اللَّهُ",
                "La ilaha illallah",
                "There is no deity except Allah",
                "The best remembrance",
            ),
            DhikrEntry::new(
                "سُبْحَانَ اللَّهِ وَبِحَمْدِهِ",
                "SubhanAllahi wa bihamdihi",
                "Glory be to Allah and praise be to Him",
                "Sins forgiven even if like the foam of the sea",
            ),
            DhikrEntry::new(
                "أَسْتَغْفِرُ اللَّهَ",
                "Astaghfirullah",
                "I seek forgiveness from Allah",
                "A way out from every distress",
            ),
            DhikrEntry::new(
                "لَا حَوْلَ وَلَا قُوَّةَ إِلَّا بِاللَّهِ",
                "La hawla wa la quwwata illa billah",
                "There is no power nor strength except through Allah",
                "A treasure from the treasures of Paradise",
            ),
            DhikrEntry::new(
                "سُبْحَانَ اللَّهِ الْعَظِيمِ",
                "SubhanAllahil Azim",
                "Glory be to Allah, the Magnificent",
                "Heavy on the scale, light on the tongue",
            ),
            DhikrEntry::new(
                "اللَّهُمَّ صَلِّ عَلَى مُحَمَّدٍ",
                "Allahumma salli ala Muhammad",
                "O Allah, send blessings upon Muhammad",
                "Allah sends ten blessings upon you in return",
            ),
            DhikrEntry::new(
                "حَسْبُنَا اللَّهُ وَنِعْمَ الْوَكِيلُ",
                "Hasbunallahu wa ni'mal wakil",
                "Allah is sufficient for us, and He is the best disposer of affairs",
                "Sufficiency against what worries you",
            ),
        ];
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DhikrEntry] {
        &self.entries
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &DhikrEntry {
        self.entries.choose(rng).unwrap_or(&self.entries[0])
    }

    pub fn pick_random(&self) -> DhikrEntry {
        self.pick(&mut rand::thread_rng()).clone()
    }

    pub fn round_robin(&self, index: usize) -> &DhikrEntry {
        &self.entries[index % self.entries.len()]
    }
}

impl Default for DhikrCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::DhikrCatalog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn empty_catalog_falls_back_to_builtin() {
        let catalog = DhikrCatalog::new(Vec::new());
        assert_eq!(catalog.len(), DhikrCatalog::builtin().len());
        assert!(!catalog.is_empty());
    }

    #[test]
    fn seeded_picks_stay_inside_catalog() {
        let catalog = DhikrCatalog::builtin();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let entry = catalog.pick(&mut rng);
            assert!(catalog.entries().contains(entry));
        }
    }

    #[test]
    fn round_robin_wraps() {
        let catalog = DhikrCatalog::builtin();
        assert_eq!(catalog.round_robin(0), catalog.round_robin(catalog.len()));
    }
}
