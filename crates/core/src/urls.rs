use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn audio_url_from_template(
    template: &str,
    source_id: &str,
    track_id: &str,
) -> Result<Url, url::ParseError> {
    let source = utf8_percent_encode(source_id.trim(), SEGMENT).to_string();
    let track = utf8_percent_encode(track_id.trim(), SEGMENT).to_string();
    let padded = match track_id.trim().parse::<u32>() {
        Ok(n) => format!("{n:03}"),
        Err(_) => track.clone(),
    };

    let filled = template
        .replace("{source}", &source)
        .replace("{track:03}", &padded)
        .replace("{track}", &track);
    Url::parse(&filled)
}

#[cfg(test)]
mod tests {
    use super::audio_url_from_template;

    #[test]
    fn template_pads_numeric_tracks() {
        let url = audio_url_from_template(
            "https://download.quranicaudio.com/quran/{source}/{track:03}.mp3",
            "mishaari_raashid_al_3afaasee",
            "2",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://download.quranicaudio.com/quran/mishaari_raashid_al_3afaasee/002.mp3"
        );
    }

    #[test]
    fn template_encodes_path_separators() {
        let url = audio_url_from_template("https://cdn.example/{source}/{track}", "a/b c", "7")
            .unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/a%2Fb%20c/7");
    }

    #[test]
    fn broken_template_is_an_error() {
        assert!(audio_url_from_template("not a url {source}", "x", "1").is_err());
    }
}
