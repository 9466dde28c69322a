//! File layout of the GRCh38 1000 Genomes (CCDG 2020-08-05) phased reference panel.

use std::path::PathBuf;

/// Panel chromosomes in concatenation order.
pub const GRCH38_1KG_CHROMOSOMES: [&str; 23] = [
    "chr1", "chr2", "chr3", "chr4", "chr5", "chr6", "chr7", "chr8", "chr9", "chr10", "chr11",
    "chr12", "chr13", "chr14", "chr15", "chr16", "chr17", "chr18", "chr19", "chr20", "chr21",
    "chr22", "chrX",
];

const PANEL_RELEASE_PREFIX: &str = "CCDG_14151_B01_GRM_WGS_2020-08-05";
const AUTOSOME_PHASING_TAG: &str = "filtered.shapeit2-duohmm-phased";
const CHRX_STEM: &str = "CCDG_14151_B01_GRM_WGS_2020-08-05_chrX.filtered.eagle2-phased.v2";
const GENETIC_MAP_SUFFIX: &str = "b38.gmap.gz";

pub fn is_known_chromosome(chromosome: &str) -> bool {
    GRCH38_1KG_CHROMOSOMES.contains(&chromosome)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePanel {
    dir: PathBuf,
}

impl ReferencePanel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Phased panel VCF, also used as the `--regions-file` for mpileup.
    pub fn reference_vcf(&self, chromosome: &str) -> PathBuf {
        self.dir.join(format!("{}.vcf.gz", panel_stem(chromosome)))
    }

    pub fn reference_bcf(&self, chromosome: &str) -> PathBuf {
        self.dir.join(format!("{}.bcf", panel_stem(chromosome)))
    }

    pub fn genetic_map(&self, chromosome: &str) -> PathBuf {
        self.dir.join(format!("{chromosome}.{GENETIC_MAP_SUFFIX}"))
    }

    pub fn files_for(&self, chromosome: &str) -> [PathBuf; 3] {
        [
            self.reference_vcf(chromosome),
            self.reference_bcf(chromosome),
            self.genetic_map(chromosome),
        ]
    }

    pub fn missing_files<'a, I>(&self, chromosomes: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = &'a str>,
    {
        chromosomes
            .into_iter()
            .flat_map(|chromosome| self.files_for(chromosome))
            .filter(|path| !path.is_file())
            .collect()
    }
}

// chrX ships eagle2-phased rather than shapeit2-duohmm-phased.
fn panel_stem(chromosome: &str) -> String {
    if chromosome == "chrX" {
        CHRX_STEM.to_string()
    } else {
        format!("{PANEL_RELEASE_PREFIX}_{chromosome}.{AUTOSOME_PHASING_TAG}")
    }
}
